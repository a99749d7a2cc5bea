use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use kula_payment_engine::{AuditApi, OrderFlowApi, ReconcilerApi, SqliteDatabase};
use log::*;
use mpesa_tools::MpesaApi;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    reaper::start_reaper_worker,
    routes::{
        accept_order,
        create_order,
        financial_audit,
        financial_audit_action,
        get_order,
        health,
        payment_callback,
        push_payment,
        request_payout,
        update_order_status,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let allow_simulation = !config.require_live_gateway;
    let mode = config
        .mpesa
        .validate(allow_simulation)
        .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    info!("🚀️ M-Pesa gateway running in {mode} mode");
    let gateway = MpesaApi::new(config.mpesa.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let _reaper = start_reaper_worker(db.clone(), config.pending_order_ttl, config.reaper_interval_secs);
    let srv = create_server_instance(config, db, gateway)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: MpesaApi,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone());
        let reconciler_api = ReconcilerApi::new(db.clone());
        let audit_api = AuditApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("kps::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(reconciler_api))
            .app_data(web::Data::new(audit_api))
            .app_data(web::Data::new(gateway.clone()))
            .service(health)
            .service(create_order)
            .service(get_order)
            .service(update_order_status)
            .service(accept_order)
            .service(push_payment)
            .service(payment_callback)
            .service(request_payout)
            .service(financial_audit)
            .service(financial_audit_action)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
