//! Integration test harness for the TSH portal.
//!
//! Each test starts two in-process servers on ephemeral ports:
//!
//! - [`FakeZoho`]: the Zoho OAuth, Books and Inventory endpoints the
//!   portal calls, plus a Resend-compatible `/resend/emails` sink
//! - [`TestPortal`]: the real router over the in-memory key-value store,
//!   configured to talk to the fake
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tsh-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{
        StatusCode,
        header::{CONTENT_TYPE, RETRY_AFTER},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tsh_core::{CustomerId, Email, PriceListId, WarehouseId};
use tsh_storefront::config::{
    CacheTtls, EmailConfig, KvConfig, PortalConfig, SyncConfig, ZohoConfig,
};
use tsh_storefront::kv::MemoryKv;
use tsh_storefront::models::CurrentCustomer;
use tsh_storefront::services::email::EmailService;
use tsh_storefront::state::AppState;

/// Wholesale warehouse used by the seeded data.
pub const WAREHOUSE_ID: &str = "500";

/// Consumer price list for guests.
pub const DEFAULT_LIST: &str = "PB-DEFAULT";

/// Price list assigned to the seeded customer.
pub const WHOLESALE_LIST: &str = "PB-WHOLESALE";

/// Seeded active customer.
pub const CUSTOMER_ID: &str = "C-1";
pub const CUSTOMER_EMAIL: &str = "buyer@example.com";

/// Seeded inactive customer.
pub const INACTIVE_EMAIL: &str = "closed@example.com";

pub const CRON_SECRET: &str = "cron-secret-for-tests";
pub const WEBHOOK_SECRET: &str = "webhook-secret-for-tests";

const SESSION_SECRET: &str = "k8#Qz!v2Lr9@Xw4$Tn6^Bp1&Hy3*Jm5%";
const JWT_SECRET: &str = "Vb7!nR2@qL9#xT4$wM6%zK1^pH3&jD8*";

/// Recorded state of the fake Zoho organization.
#[derive(Debug, Default)]
pub struct FakeData {
    /// Rows returned by `GET /items`.
    pub items: Vec<Value>,
    /// Bodies returned by `GET /items/{id}` when they differ from the row.
    pub item_details: HashMap<String, Value>,
    pub images: HashMap<String, Vec<u8>>,
    pub contacts: HashMap<String, Value>,
    pub pricebooks: HashMap<String, Value>,
    pub salesorders: Vec<Value>,
    pub invoices: Vec<Value>,
    /// Reject `POST /salesorders/{id}/status/confirmed`.
    pub fail_confirm: bool,
    pub token_grants: u32,
    pub item_fetches: u32,
    pub item_list_fetches: u32,
    /// `GET /items` claims another page is always available.
    pub endless_items: bool,
    /// `page` parameter of each `GET /salesorders`.
    pub salesorder_pages: Vec<String>,
    /// Answer the next N API requests with 429 and `Retry-After: 1`.
    pub rate_limited: u32,
    /// Answer the next N API requests with 401.
    pub unauthorized: u32,
    /// Books and Inventory requests seen, faults included.
    pub api_requests: u32,
    /// Messages posted to the Resend sink.
    pub emails: Vec<Value>,
}

/// In-process fake of the Zoho APIs and Resend.
#[derive(Clone)]
pub struct FakeZoho {
    pub url: String,
    data: Arc<Mutex<FakeData>>,
}

type Shared = Arc<Mutex<FakeData>>;

fn lock(data: &Shared) -> MutexGuard<'_, FakeData> {
    data.lock().unwrap_or_else(PoisonError::into_inner)
}

fn ok(mut body: Value) -> Json<Value> {
    body["code"] = json!(0);
    body["message"] = json!("success");
    Json(body)
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "code": 1002, "message": format!("{what} does not exist") })),
    )
        .into_response()
}

fn page_of(rows: Vec<Value>, query: &HashMap<String, String>) -> (Vec<Value>, Value) {
    let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1).max(1);
    let per_page: usize = query
        .get("per_page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(200)
        .max(1);
    let total = rows.len();
    let slice = rows
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();
    let context = json!({
        "page": page,
        "per_page": per_page,
        "has_more_page": page * per_page < total,
    });
    (slice, context)
}

fn for_customer(rows: &[Value], query: &HashMap<String, String>) -> Vec<Value> {
    rows.iter()
        .filter(|row| {
            query
                .get("customer_id")
                .is_none_or(|id| row["customer_id"] == json!(id))
        })
        .cloned()
        .collect()
}

/// Serve queued 429 and 401 faults before the real handler.
async fn inject_faults(State(data): State<Shared>, request: Request, next: Next) -> Response {
    {
        let mut data = lock(&data);
        data.api_requests += 1;
        if data.rate_limited > 0 {
            data.rate_limited -= 1;
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(RETRY_AFTER, "1")],
                Json(json!({ "code": 44, "message": "Too many requests" })),
            )
                .into_response();
        }
        if data.unauthorized > 0 {
            data.unauthorized -= 1;
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "code": 57, "message": "You are not authorized to perform this operation" })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn token(State(data): State<Shared>) -> Json<Value> {
    lock(&data).token_grants += 1;
    Json(json!({ "access_token": "fake-access-token", "expires_in": 3600 }))
}

async fn list_items(
    State(data): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut data = lock(&data);
    data.item_list_fetches += 1;
    let (items, mut context) = page_of(data.items.clone(), &query);
    if data.endless_items {
        context["has_more_page"] = json!(true);
    }
    ok(json!({ "items": items, "page_context": context }))
}

async fn get_item(State(data): State<Shared>, Path(id): Path<String>) -> Response {
    let mut data = lock(&data);
    data.item_fetches += 1;
    let item = data.item_details.get(&id).cloned().or_else(|| {
        data.items
            .iter()
            .find(|item| item["item_id"] == json!(id))
            .cloned()
    });
    match item {
        Some(item) => ok(json!({ "item": item })).into_response(),
        None => not_found("Item"),
    }
}

async fn item_image(State(data): State<Shared>, Path(id): Path<String>) -> Response {
    match lock(&data).images.get(&id) {
        Some(bytes) => ([(CONTENT_TYPE, "image/png")], bytes.clone()).into_response(),
        None => not_found("Image"),
    }
}

async fn find_contacts(
    State(data): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let email = query.get("email").map(|e| e.to_lowercase());
    let contacts: Vec<Value> = lock(&data)
        .contacts
        .values()
        .filter(|c| {
            email
                .as_deref()
                .is_none_or(|e| c["email"].as_str().is_some_and(|ce| ce.eq_ignore_ascii_case(e)))
        })
        .map(|c| json!({ "contact_id": c["contact_id"], "contact_name": c["contact_name"] }))
        .collect();
    ok(json!({ "contacts": contacts }))
}

async fn get_contact(State(data): State<Shared>, Path(id): Path<String>) -> Response {
    match lock(&data).contacts.get(&id) {
        Some(contact) => ok(json!({ "contact": contact })).into_response(),
        None => not_found("Contact"),
    }
}

async fn get_pricebook(State(data): State<Shared>, Path(id): Path<String>) -> Response {
    match lock(&data).pricebooks.get(&id) {
        Some(book) => ok(json!({ "pricebook": book })).into_response(),
        None => not_found("Price book"),
    }
}

async fn create_salesorder(State(data): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut data = lock(&data);
    let number = data.salesorders.len() + 1;
    let mut order = body;
    order["salesorder_id"] = json!(format!("SO-{number}"));
    order["salesorder_number"] = json!(format!("SO-{number:05}"));
    order["status"] = json!("draft");
    data.salesorders.push(order.clone());
    ok(json!({ "salesorder": order }))
}

async fn list_salesorders(
    State(data): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut data = lock(&data);
    data.salesorder_pages
        .push(query.get("page").cloned().unwrap_or_default());
    let rows = for_customer(&data.salesorders, &query);
    let (rows, context) = page_of(rows, &query);
    ok(json!({ "salesorders": rows, "page_context": context }))
}

async fn get_salesorder(State(data): State<Shared>, Path(id): Path<String>) -> Response {
    let data = lock(&data);
    match data.salesorders.iter().find(|o| o["salesorder_id"] == json!(id)) {
        Some(order) => ok(json!({ "salesorder": order })).into_response(),
        None => not_found("Sales order"),
    }
}

async fn confirm_salesorder(State(data): State<Shared>, Path(id): Path<String>) -> Response {
    let mut data = lock(&data);
    if data.fail_confirm {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 36004, "message": "Sales order cannot be confirmed" })),
        )
            .into_response();
    }
    match data
        .salesorders
        .iter_mut()
        .find(|o| o["salesorder_id"] == json!(id))
    {
        Some(order) => {
            order["status"] = json!("open");
            ok(json!({})).into_response()
        }
        None => not_found("Sales order"),
    }
}

async fn invoice_from_salesorder(
    State(data): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut data = lock(&data);
    let Some(order) = query
        .get("salesorder_id")
        .and_then(|id| data.salesorders.iter().find(|o| o["salesorder_id"] == json!(id)))
        .cloned()
    else {
        return not_found("Sales order");
    };

    let number = data.invoices.len() + 1;
    let invoice = json!({
        "invoice_id": format!("INV-{number}"),
        "invoice_number": format!("INV-{number:05}"),
        "customer_id": order["customer_id"],
        "status": "sent",
        "salesorder_id": order["salesorder_id"],
        "line_items": order["line_items"],
    });
    data.invoices.push(invoice.clone());
    ok(json!({ "invoice": invoice })).into_response()
}

async fn list_invoices(
    State(data): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let rows = for_customer(&lock(&data).invoices, &query);
    let (rows, context) = page_of(rows, &query);
    ok(json!({ "invoices": rows, "page_context": context }))
}

async fn get_invoice(State(data): State<Shared>, Path(id): Path<String>) -> Response {
    let data = lock(&data);
    match data.invoices.iter().find(|i| i["invoice_id"] == json!(id)) {
        Some(invoice) => ok(json!({ "invoice": invoice })).into_response(),
        None => not_found("Invoice"),
    }
}

async fn list_payments() -> Json<Value> {
    ok(json!({ "customerpayments": [], "page_context": { "page": 1, "has_more_page": false } }))
}

async fn list_credit_notes() -> Json<Value> {
    ok(json!({ "creditnotes": [], "page_context": { "page": 1, "has_more_page": false } }))
}

async fn capture_email(State(data): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut data = lock(&data);
    data.emails.push(body);
    Json(json!({ "id": format!("email-{}", data.emails.len()) }))
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local address");
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("test server");
    });
    format!("http://{addr}")
}

impl FakeZoho {
    /// Start an empty fake.
    pub async fn start() -> Self {
        let data: Shared = Arc::default();
        let router = Router::new()
            .route("/inventory/v1/items", get(list_items))
            .route("/inventory/v1/items/{id}", get(get_item))
            .route("/inventory/v1/items/{id}/image", get(item_image))
            .route("/inventory/v1/contacts/{id}", get(get_contact))
            .route("/books/v3/contacts", get(find_contacts))
            .route("/books/v3/contacts/{id}", get(get_contact))
            .route("/books/v3/pricebooks/{id}", get(get_pricebook))
            .route(
                "/books/v3/salesorders",
                get(list_salesorders).post(create_salesorder),
            )
            .route("/books/v3/salesorders/{id}", get(get_salesorder))
            .route(
                "/books/v3/salesorders/{id}/status/confirmed",
                post(confirm_salesorder),
            )
            .route("/books/v3/invoices", get(list_invoices))
            .route("/books/v3/invoices/fromsalesorder", post(invoice_from_salesorder))
            .route("/books/v3/invoices/{id}", get(get_invoice))
            .route("/books/v3/customerpayments", get(list_payments))
            .route("/books/v3/creditnotes", get(list_credit_notes))
            .route_layer(middleware::from_fn_with_state(
                Arc::clone(&data),
                inject_faults,
            ))
            .route("/oauth/v2/token", post(token))
            .route("/resend/emails", post(capture_email))
            .with_state(Arc::clone(&data));

        let url = serve(router).await;
        Self { url, data }
    }

    /// Start a fake holding the standard catalog, price lists and contacts.
    ///
    /// | item | list row stock | wholesale stock | default | wholesale list |
    /// |------|----------------|-----------------|---------|----------------|
    /// | 1001 | per location   | 10              | 1000    | 800            |
    /// | 1002 | totals only    | 4 (detail)      | 2000    | -              |
    /// | 1003 | per location   | 0               | 3000    | -              |
    /// | 1004 | inactive       | -               | -       | -              |
    pub async fn seeded() -> Self {
        let fake = Self::start().await;
        {
            let mut data = fake.data();
            data.items = vec![
                json!({
                    "item_id": "1001", "name": "HDMI Cable 2m", "sku": "HDMI-2M",
                    "status": "active", "unit": "pcs", "rate": 1000,
                    "category_id": "CAT-1", "category_name": "Cables",
                    "image_document_id": "DOC-1",
                    "locations": [
                        { "location_id": WAREHOUSE_ID, "location_available_for_sale_stock": 10 },
                        { "location_id": "400", "location_available_for_sale_stock": 99 }
                    ]
                }),
                json!({
                    "item_id": "1002", "name": "Router AX3000", "sku": "RT-AX3000",
                    "status": "active", "unit": "pcs", "rate": 2000,
                    "category_id": "CAT-2", "category_name": "Networking",
                    "available_for_sale_stock": 50
                }),
                json!({
                    "item_id": "1003", "name": "Switch 8 Port", "sku": "SW-8P",
                    "status": "active", "unit": "pcs", "rate": 3000,
                    "category_id": "CAT-2", "category_name": "Networking",
                    "locations": [
                        { "location_id": WAREHOUSE_ID, "location_available_for_sale_stock": 0 }
                    ]
                }),
                json!({
                    "item_id": "1004", "name": "Legacy Modem", "sku": "MDM-OLD",
                    "status": "inactive", "unit": "pcs", "rate": 500
                }),
            ];
            data.item_details.insert(
                "1002".to_string(),
                json!({
                    "item_id": "1002", "name": "Router AX3000", "sku": "RT-AX3000",
                    "status": "active", "unit": "pcs", "rate": 2000,
                    "category_id": "CAT-2", "category_name": "Networking",
                    "available_for_sale_stock": 50,
                    "locations": [
                        { "location_id": WAREHOUSE_ID, "location_available_for_sale_stock": 4 },
                        { "location_id": "400", "location_available_for_sale_stock": 46 }
                    ]
                }),
            );
            data.images.insert("1001".to_string(), b"\x89PNG fake".to_vec());

            data.pricebooks.insert(
                DEFAULT_LIST.to_string(),
                json!({
                    "pricebook_id": DEFAULT_LIST, "name": "Consumer", "currency_code": "IQD",
                    "pricebook_type": "per_item",
                    "pricebook_items": [
                        { "item_id": "1001", "pricebook_rate": 1000 },
                        { "item_id": "1002", "pricebook_rate": 2000 },
                        { "item_id": "1003", "pricebook_rate": 3000 }
                    ]
                }),
            );
            data.pricebooks.insert(
                WHOLESALE_LIST.to_string(),
                json!({
                    "pricebook_id": WHOLESALE_LIST, "name": "Wholesale", "currency_code": "IQD",
                    "pricebook_type": "per_item",
                    "pricebook_items": [{ "item_id": "1001", "pricebook_rate": 800 }]
                }),
            );

            data.contacts.insert(
                CUSTOMER_ID.to_string(),
                json!({
                    "contact_id": CUSTOMER_ID, "contact_name": "Ali Hassan",
                    "company_name": "Baghdad Trading Co.", "email": CUSTOMER_EMAIL,
                    "status": "active", "pricebook_id": WHOLESALE_LIST,
                    "currency_code": "IQD", "outstanding_receivable_amount": 150_000,
                    "language_code": "ar"
                }),
            );
            data.contacts.insert(
                "C-2".to_string(),
                json!({
                    "contact_id": "C-2", "contact_name": "Closed Account",
                    "email": INACTIVE_EMAIL, "status": "inactive"
                }),
            );
        }
        fake
    }

    /// Lock the recorded state.
    pub fn data(&self) -> MutexGuard<'_, FakeData> {
        lock(&self.data)
    }

    /// Set the wholesale stock of an item in both its row and its detail.
    pub fn set_stock(&self, item_id: &str, quantity: f64) {
        let mut data = self.data();
        let locations = json!([{ "location_id": WAREHOUSE_ID, "location_available_for_sale_stock": quantity }]);
        for item in &mut data.items {
            if item["item_id"] == json!(item_id) {
                item["locations"] = locations.clone();
            }
        }
        if let Some(detail) = data.item_details.get_mut(item_id) {
            detail["locations"] = locations;
        }
    }

    /// Last email posted to the Resend sink.
    pub fn last_email(&self) -> Option<Value> {
        self.data().emails.last().cloned()
    }
}

/// First run of exactly six digits in an email body.
pub fn extract_code(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut start = 0;
    while start < chars.len() {
        if chars.get(start).is_some_and(char::is_ascii_digit) {
            let end = chars
                .iter()
                .skip(start)
                .position(|c| !c.is_ascii_digit())
                .map_or(chars.len(), |len| start + len);
            if end - start == 6 {
                return Some(chars.iter().skip(start).take(6).collect());
            }
            start = end;
        } else {
            start += 1;
        }
    }
    None
}

/// First `http(s)://` link in an email body.
pub fn extract_link(text: &str) -> Option<String> {
    let start = text.find("http")?;
    let link: String = text
        .chars()
        .skip(text.get(..start)?.chars().count())
        .take_while(|c| !c.is_whitespace())
        .collect();
    Some(link)
}

/// Decimal amount of a serialized `Money`, which may be a string or number.
#[must_use]
pub fn amount(money: &Value) -> Option<f64> {
    match &money["amount"] {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// A running portal wired to a [`FakeZoho`].
pub struct TestPortal {
    pub url: String,
    pub state: AppState,
    pub zoho: FakeZoho,
}

impl TestPortal {
    /// Portal configuration pointing at `zoho`.
    #[must_use]
    pub fn config(zoho: &FakeZoho, base_url: &str) -> PortalConfig {
        PortalConfig {
            host: "127.0.0.1".parse().expect("loopback address"),
            port: 0,
            base_url: base_url.to_string(),
            session_secret: SecretString::from(SESSION_SECRET),
            jwt_secret: SecretString::from(JWT_SECRET),
            cron_secret: Some(SecretString::from(CRON_SECRET)),
            webhook_secret: Some(SecretString::from(WEBHOOK_SECRET)),
            zoho: ZohoConfig {
                accounts_url: zoho.url.clone(),
                books_url: format!("{}/books/v3", zoho.url),
                inventory_url: format!("{}/inventory/v1", zoho.url),
                client_id: "1000.TESTCLIENT".to_string(),
                client_secret: SecretString::from("client-secret"),
                refresh_token: SecretString::from("refresh-token"),
                organization_id: "748369814".to_string(),
                wholesale_warehouse_id: WarehouseId::new(WAREHOUSE_ID),
                default_price_list_id: PriceListId::new(DEFAULT_LIST),
            },
            kv: KvConfig::Memory,
            email: EmailConfig {
                resend_api_key: Some(SecretString::from("re_test_key")),
                from: "TSH <noreply@tsh.sale>".to_string(),
            },
            cache: CacheTtls::default(),
            sync: SyncConfig {
                interval: None,
                batch_size: 2,
                batch_delay: Duration::ZERO,
                lock_ttl: Duration::from_secs(60),
            },
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Start a portal against a seeded fake.
    pub async fn start() -> Self {
        Self::start_with(FakeZoho::seeded().await).await
    }

    /// Start a portal against `zoho`.
    pub async fn start_with(zoho: FakeZoho) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local address");
        let url = format!("http://{addr}");

        let config = Self::config(&zoho, &url);
        let email = EmailService::new(&config.email)
            .expect("email client")
            .with_base_url(format!("{}/resend", zoho.url));
        let state = AppState::with_parts(config, Arc::new(MemoryKv::new()), email)
            .expect("application state");

        let app = tsh_storefront::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("portal server");
        });

        Self { url, state, zoho }
    }

    /// Absolute URL of a portal path.
    #[must_use]
    pub fn at(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    /// HTTP client that keeps cookies and does not follow redirects.
    #[must_use]
    pub fn browser() -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("HTTP client")
    }

    /// Access token for the seeded customer, minted without the email flow.
    pub async fn access_token(&self) -> String {
        let customer = CurrentCustomer {
            id: CustomerId::new(CUSTOMER_ID),
            email: Email::parse(CUSTOMER_EMAIL).expect("valid email"),
            name: "Baghdad Trading Co.".to_string(),
        };
        self.state
            .auth()
            .issue_tokens(&customer)
            .await
            .expect("token pair")
            .access_token
    }
}
