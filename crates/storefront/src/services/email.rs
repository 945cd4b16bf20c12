//! Transactional email via the Resend HTTP API.
//!
//! Only login mail is sent: a 6-digit code and, for browser logins, a
//! magic link. Every message carries both languages with the customer's
//! preferred one first. Without `RESEND_API_KEY` the message is logged
//! instead of sent so local development needs no mail account.

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use tsh_core::{Email, Locale};

use crate::config::EmailConfig;

/// Resend API base URL.
const BASE_URL: &str = "https://api.resend.com";

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resend rejected the message.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The API key cannot be used as a header value.
    #[error("invalid API key format")]
    InvalidKey,
}

/// A rendered message.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Login message content.
#[derive(Debug, Clone, Copy)]
pub struct LoginEmail<'a> {
    pub code: &'a str,
    pub magic_link: Option<&'a str>,
    pub locale: Locale,
    pub minutes_valid: u64,
}

impl LoginEmail<'_> {
    fn subject(&self) -> String {
        match self.locale {
            Locale::Ar => format!("رمز الدخول إلى TSH: {} | Your TSH login code", self.code),
            Locale::En => format!("Your TSH login code: {} | رمز الدخول إلى TSH", self.code),
        }
    }

    fn english_text(&self) -> String {
        let mut text = format!(
            "Your login code is {}. It expires in {} minutes.",
            self.code, self.minutes_valid
        );
        if let Some(link) = self.magic_link {
            text.push_str(&format!("\nOr sign in with this link: {link}"));
        }
        text.push_str("\nIf you did not request this, you can ignore this email.");
        text
    }

    fn arabic_text(&self) -> String {
        let mut text = format!(
            "رمز الدخول الخاص بك هو {}. تنتهي صلاحيته خلال {} دقيقة.",
            self.code, self.minutes_valid
        );
        if let Some(link) = self.magic_link {
            text.push_str(&format!("\nأو سجّل الدخول عبر هذا الرابط: {link}"));
        }
        text.push_str("\nإذا لم تطلب هذا الرمز يمكنك تجاهل هذه الرسالة.");
        text
    }

    fn ordered_texts(&self) -> [(String, &'static str); 2] {
        let en = (self.english_text(), "ltr");
        let ar = (self.arabic_text(), "rtl");
        match self.locale {
            Locale::Ar => [ar, en],
            Locale::En => [en, ar],
        }
    }

    /// Render to a message for `to`.
    #[must_use]
    pub fn render(&self, from: &str, to: &Email) -> OutgoingEmail {
        let texts = self.ordered_texts();

        let html = texts
            .iter()
            .map(|(text, dir)| {
                let body = html_escape(text).replace('\n', "<br>");
                format!(r#"<div dir="{dir}" style="font-family:sans-serif;margin-bottom:24px">{body}</div>"#)
            })
            .collect::<String>();
        let text = texts
            .iter()
            .map(|(text, _)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        OutgoingEmail {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: self.subject(),
            html,
            text,
        }
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Resend client; logs messages when no key is configured.
#[derive(Clone)]
pub struct EmailService {
    client: Option<reqwest::Client>,
    base_url: String,
    from: String,
}

impl EmailService {
    /// Create the email service.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let client = match &config.resend_api_key {
            Some(key) => {
                let mut headers = HeaderMap::new();
                let auth_value = format!("Bearer {}", key.expose_secret());
                headers.insert(
                    "Authorization",
                    HeaderValue::from_str(&auth_value).map_err(|_| EmailError::InvalidKey)?,
                );
                Some(reqwest::Client::builder().default_headers(headers).build()?)
            }
            None => None,
        };

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            from: config.from.clone(),
        })
    }

    /// Point the client at another Resend-compatible host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether messages are actually delivered.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Send a login code (and magic link) to `to`.
    ///
    /// # Errors
    ///
    /// Returns error if Resend rejects the message or is unreachable.
    #[instrument(skip(self, content), fields(to = %to.masked()))]
    pub async fn send_login(&self, to: &Email, content: &LoginEmail<'_>) -> Result<(), EmailError> {
        let message = content.render(&self.from, to);

        let Some(client) = &self.client else {
            warn!(
                to = %to.masked(),
                code = content.code,
                magic_link = content.magic_link,
                "RESEND_API_KEY not set, login email not sent"
            );
            return Ok(());
        };

        let response = client
            .post(format!("{}/emails", self.base_url))
            .json(&message)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        info!("Login email sent");
        Ok(())
    }
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("enabled", &self.client.is_some())
            .field("base_url", &self.base_url)
            .field("from", &self.from)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn content(locale: Locale) -> LoginEmail<'static> {
        LoginEmail {
            code: "482913",
            magic_link: Some("https://portal.tsh.sale/api/auth/magic?token=abc"),
            locale,
            minutes_valid: 10,
        }
    }

    #[test]
    fn test_render_contains_both_languages() {
        let to = Email::parse("buyer@example.com").unwrap();
        let message = content(Locale::En).render("TSH <noreply@tsh.sale>", &to);

        assert_eq!(message.to, vec!["buyer@example.com".to_string()]);
        assert!(message.subject.starts_with("Your TSH login code: 482913"));
        assert!(message.text.contains("Your login code is 482913"));
        assert!(message.text.contains("رمز الدخول الخاص بك هو 482913"));
        assert!(message.html.contains(r#"dir="rtl""#));
        assert!(message.html.contains("magic?token=abc"));
    }

    #[test]
    fn test_render_puts_arabic_first() {
        let to = Email::parse("buyer@example.com").unwrap();
        let message = content(Locale::Ar).render("TSH <noreply@tsh.sale>", &to);

        let ar = message.text.find("رمز الدخول").unwrap();
        let en = message.text.find("Your login code").unwrap();
        assert!(ar < en);
        assert!(message.html.starts_with(r#"<div dir="rtl""#));
    }

    #[test]
    fn test_render_without_magic_link() {
        let to = Email::parse("buyer@example.com").unwrap();
        let mut content = content(Locale::En);
        content.magic_link = None;
        let message = content.render("TSH <noreply@tsh.sale>", &to);
        assert!(!message.text.contains("link"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn test_disabled_without_key() {
        let service = EmailService::new(&EmailConfig {
            resend_api_key: None,
            from: "TSH <noreply@tsh.sale>".to_string(),
        })
        .unwrap();
        assert!(!service.is_enabled());
    }
}
