use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use faktura_engine::{
    events::{EventHandlers, EventProducers},
    sqlite::MIGRATOR,
    CredentialApi,
    InvoiceApi,
    OrderFlowApi,
    PaymentApi,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::{BasicPdfRenderer, LocalObjectStore, LogMailer},
    overdue_worker::start_overdue_worker,
    routes::{
        health,
        CancelOrderRoute,
        ListOrdersRoute,
        OrderInvoiceRoute,
        OrderStatusRoute,
        ReceiveOrderRoute,
        RegisterPaymentRoute,
        RetryWebhooksRoute,
        SendInvoiceRoute,
        UpdateOrderRoute,
    },
    webhooks::{webhook_hooks, ReqwestTransport, WebhookDispatcher},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    MIGRATOR.run(db.pool()).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🗃️ Database migrations are up to date");

    let transport = ReqwestTransport::new().map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let dispatcher = WebhookDispatcher::new(db.clone(), Arc::new(transport));
    let hooks = webhook_hooks(dispatcher.clone());
    let handlers = EventHandlers::new(config.event_buffer_size, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let invoice_api = new_invoice_api(&config, db.clone(), producers.clone());
    let _worker = start_overdue_worker(invoice_api, config.overdue_sweep_interval_secs);

    let srv = create_server_instance(config, db, producers, dispatcher)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

fn new_invoice_api(config: &ServerConfig, db: SqliteDatabase, producers: EventProducers) -> InvoiceApi<SqliteDatabase> {
    InvoiceApi::new(
        db,
        Arc::new(BasicPdfRenderer),
        Arc::new(LocalObjectStore::new(config.pdf_storage_dir.clone())),
        Arc::new(LogMailer),
        producers,
    )
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
    dispatcher: WebhookDispatcher<SqliteDatabase>,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let invoice_api = new_invoice_api(&config, db.clone(), producers.clone());
        let payments_api = PaymentApi::new(db.clone(), producers.clone());
        let credentials_api = CredentialApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("fakt::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(invoice_api))
            .app_data(web::Data::new(payments_api))
            .app_data(web::Data::new(credentials_api))
            .app_data(web::Data::new(dispatcher.clone()))
            .service(health)
            .service(ReceiveOrderRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(OrderStatusRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(ListOrdersRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(OrderInvoiceRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(CancelOrderRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(UpdateOrderRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(SendInvoiceRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(RegisterPaymentRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(RetryWebhooksRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
