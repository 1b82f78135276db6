//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go
//! into a separate module. Keep this module neat and tidy 🙏
//!
//! Mutating endpoints authenticate with the full HMAC handshake against the raw body bytes;
//! read endpoints only need a valid `X-API-Key`. Authentication always runs before
//! deserialization, so an unsigned request never reaches a parser.
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use faktura_engine::{
    api::objects::{IncomingOrder, InvoiceQueryFilter, OrderUpdate},
    db_types::{Invoice, InvoiceStatus},
    sqlite::SqliteDatabase,
    traits::{CredentialManagement, InvoicingDatabase},
    CredentialApi,
    InvoiceApi,
    OrderFlowApi,
    PaymentApi,
};
use log::*;

use crate::{
    auth::{require_api_key, require_signed_request},
    data_objects::{
        CancelOrderDto,
        CancelResponseDto,
        InvoiceDetailDto,
        JsonResponse,
        OrderListQuery,
        OrderListResponseDto,
        OrderReceiveResponseDto,
        OrderStatusResponseDto,
        PaymentResponseDto,
        ReceiveOrderDto,
        RegisterPaymentDto,
        SourceQuery,
        UpdateOrderDto,
    },
    errors::ServerError,
    webhooks::WebhookDispatcher,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders   ----------------------------------------------------
route!(receive_order => Post "/orders/receive" impl InvoicingDatabase, CredentialManagement);
/// Route handler for order ingestion.
///
/// A signed order payload becomes a draft invoice with a generated invoice number and KID. A
/// repeated `(source, sourceOrderId)` pair returns 409 with the original invoice number in the
/// message, so partner systems can retry deliveries blindly. With `autoSend` set, the invoice is
/// rendered and mailed before the response; a send failure still returns 201 with the invoice
/// left in `DRAFT`.
pub async fn receive_order<B: InvoicingDatabase, C: CredentialManagement>(
    req: HttpRequest,
    body: Bytes,
    orders: web::Data<OrderFlowApi<B>>,
    invoices: web::Data<InvoiceApi<B>>,
    credentials: web::Data<CredentialApi<C>>,
) -> Result<HttpResponse, ServerError> {
    let credential = require_signed_request(&req, &body, &credentials).await?;
    let dto: ReceiveOrderDto = serde_json::from_slice(&body)
        .map_err(|e| ServerError::InvalidRequestBody(format!("Could not deserialize order. {e}")))?;
    let order = IncomingOrder::try_from(dto)?;
    let auto_send = order.auto_send;
    debug!(
        "💻️ [{}] delivering order {}/{} ({} lines)",
        credential.display_name,
        order.source,
        order.source_order_id,
        order.lines.len()
    );
    let mut invoice = orders.process_order(order).await?;
    if auto_send {
        match invoices.send(&invoice.invoice_number).await {
            Ok(sent) => invoice = sent,
            Err(e) => warn!("💻️ Auto-send of {} failed, invoice stays in draft. {e}", invoice.invoice_number),
        }
    }
    Ok(HttpResponse::Created().json(OrderReceiveResponseDto::from(&invoice)))
}

route!(order_status => Get "/orders/status/{order_id}" impl InvoicingDatabase, CredentialManagement);
pub async fn order_status<B: InvoicingDatabase, C: CredentialManagement>(
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<SourceQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    credentials: web::Data<CredentialApi<C>>,
) -> Result<HttpResponse, ServerError> {
    require_api_key(&req, &credentials).await?;
    let order_id = path.into_inner();
    let invoice = resolve_order(&orders, query.source.as_deref(), &order_id).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponseDto::from(&invoice)))
}

route!(list_orders => Get "/orders/list" impl InvoicingDatabase, CredentialManagement);
/// Filtered order listing. `status` takes a comma-separated list of invoice statuses; the result
/// set is capped server-side regardless of the requested limit.
pub async fn list_orders<B: InvoicingDatabase, C: CredentialManagement>(
    req: HttpRequest,
    query: web::Query<OrderListQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    credentials: web::Data<CredentialApi<C>>,
) -> Result<HttpResponse, ServerError> {
    require_api_key(&req, &credentials).await?;
    let filter = query.into_inner().try_into()?;
    let invoices = orders.list_orders(filter).await?;
    Ok(HttpResponse::Ok().json(OrderListResponseDto::from(invoices)))
}

route!(order_invoice => Get "/orders/invoice/{order_id}" impl InvoicingDatabase, CredentialManagement);
pub async fn order_invoice<B: InvoicingDatabase, C: CredentialManagement>(
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<SourceQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    credentials: web::Data<CredentialApi<C>>,
) -> Result<HttpResponse, ServerError> {
    require_api_key(&req, &credentials).await?;
    let order_id = path.into_inner();
    let invoice = resolve_order(&orders, query.source.as_deref(), &order_id).await?;
    let details = orders
        .invoice_details(&invoice.invoice_number)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No invoice found for order {order_id}")))?;
    Ok(HttpResponse::Ok().json(InvoiceDetailDto::from(&details)))
}

route!(cancel_order => Post "/orders/cancel/{order_id}" impl InvoicingDatabase, CredentialManagement);
/// Drafts are deleted outright; delivered invoices are reversed with a credit note; paid
/// invoices are refused.
pub async fn cancel_order<B: InvoicingDatabase, C: CredentialManagement>(
    req: HttpRequest,
    body: Bytes,
    path: web::Path<String>,
    query: web::Query<SourceQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    credentials: web::Data<CredentialApi<C>>,
) -> Result<HttpResponse, ServerError> {
    require_signed_request(&req, &body, &credentials).await?;
    // The body is optional; when present it may carry a cancellation reason for the audit trail.
    let dto: CancelOrderDto = if body.is_empty() {
        CancelOrderDto::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ServerError::InvalidRequestBody(format!("Could not deserialize cancellation. {e}")))?
    };
    let order_id = path.into_inner();
    let invoice = resolve_order(&orders, query.source.as_deref(), &order_id).await?;
    let outcome = orders.cancel_order(&invoice.invoice_number, dto.reason.as_deref()).await?;
    info!("💻️ Order {order_id} cancelled ({})", invoice.invoice_number);
    Ok(HttpResponse::Ok().json(CancelResponseDto::from(&outcome)))
}

route!(update_order => Post "/orders/update/{order_id}" impl InvoicingDatabase, CredentialManagement);
pub async fn update_order<B: InvoicingDatabase, C: CredentialManagement>(
    req: HttpRequest,
    body: Bytes,
    path: web::Path<String>,
    query: web::Query<SourceQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    credentials: web::Data<CredentialApi<C>>,
) -> Result<HttpResponse, ServerError> {
    require_signed_request(&req, &body, &credentials).await?;
    let dto: UpdateOrderDto = serde_json::from_slice(&body)
        .map_err(|e| ServerError::InvalidRequestBody(format!("Could not deserialize update. {e}")))?;
    let update = OrderUpdate::try_from(dto)?;
    let order_id = path.into_inner();
    let invoice = resolve_order(&orders, query.source.as_deref(), &order_id).await?;
    let updated = orders.update_order(&invoice.invoice_number, update).await?;
    Ok(HttpResponse::Ok().json(OrderReceiveResponseDto::from(&updated)))
}

route!(send_invoice => Post "/orders/send/{order_id}" impl InvoicingDatabase, CredentialManagement);
pub async fn send_invoice<B: InvoicingDatabase, C: CredentialManagement>(
    req: HttpRequest,
    body: Bytes,
    path: web::Path<String>,
    query: web::Query<SourceQuery>,
    orders: web::Data<OrderFlowApi<B>>,
    invoices: web::Data<InvoiceApi<B>>,
    credentials: web::Data<CredentialApi<C>>,
) -> Result<HttpResponse, ServerError> {
    require_signed_request(&req, &body, &credentials).await?;
    let order_id = path.into_inner();
    let invoice = resolve_order(&orders, query.source.as_deref(), &order_id).await?;
    let sent = invoices.send(&invoice.invoice_number).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponseDto::from(&sent)))
}

//----------------------------------------------  Payments  ----------------------------------------------------
route!(register_payment => Post "/payments" impl InvoicingDatabase, CredentialManagement);
/// Records a completed payment against an invoice by number. Provider adapters (Vipps, bank
/// reconciliation) all land here.
pub async fn register_payment<B: InvoicingDatabase, C: CredentialManagement>(
    req: HttpRequest,
    body: Bytes,
    payments: web::Data<PaymentApi<B>>,
    credentials: web::Data<CredentialApi<C>>,
) -> Result<HttpResponse, ServerError> {
    require_signed_request(&req, &body, &credentials).await?;
    let dto: RegisterPaymentDto = serde_json::from_slice(&body)
        .map_err(|e| ServerError::InvalidRequestBody(format!("Could not deserialize payment. {e}")))?;
    let payment = dto.into_new_payment()?;
    let outcome = payments.register_payment(payment).await?;
    info!(
        "💰️ Payment of {} registered against {}. Remaining: {}",
        outcome.payment.amount, outcome.invoice.invoice_number, outcome.remaining
    );
    Ok(HttpResponse::Ok().json(PaymentResponseDto::from(&outcome)))
}

//----------------------------------------------  Webhooks  ----------------------------------------------------
route!(retry_webhooks => Post "/webhooks/retry" impl CredentialManagement);
/// Sweeps parked failed deliveries through the send path again.
pub async fn retry_webhooks<C: CredentialManagement>(
    req: HttpRequest,
    body: Bytes,
    dispatcher: web::Data<WebhookDispatcher<SqliteDatabase>>,
    credentials: web::Data<CredentialApi<C>>,
) -> Result<HttpResponse, ServerError> {
    require_signed_request(&req, &body, &credentials).await?;
    let count = dispatcher.retry_failed().await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Retried {count} failed webhook deliveries"))))
}

//----------------------------------------------  Helpers   ----------------------------------------------------
async fn resolve_order<B: InvoicingDatabase>(
    orders: &OrderFlowApi<B>,
    source: Option<&str>,
    order_id: &str,
) -> Result<Invoice, ServerError> {
    orders
        .order_status(source, order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No order found with id {order_id}")))
}

impl TryFrom<OrderListQuery> for InvoiceQueryFilter {
    type Error = ServerError;

    fn try_from(query: OrderListQuery) -> Result<Self, Self::Error> {
        let mut filter = InvoiceQueryFilter::default();
        if let Some(source) = query.source {
            filter = filter.with_source(source);
        }
        if let Some(statuses) = query.status {
            for status in statuses.split(',').filter(|s| !s.is_empty()) {
                let status = InvoiceStatus::from_str(status.trim())
                    .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
                filter = filter.with_status(status);
            }
        }
        if let Some(from) = query.from {
            filter = filter.since(from);
        }
        if let Some(to) = query.to {
            filter = filter.until(to);
        }
        if let Some(limit) = query.limit {
            filter = filter.with_limit(limit);
        }
        Ok(filter)
    }
}
