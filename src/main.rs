mod api;
mod backend;
mod config;
mod facade;
mod forms;
mod metrics;
mod models;
mod queries;
mod session;
mod stats;
mod twoface;

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate guard;

use crate::backend::appwrite::AppwriteClient;
use crate::config::Config;
use crate::facade::Snapgram;
use crate::queries::QueryClient;
use actix_service::Service;
use actix_web::{dev::ServiceResponse, middleware, web, App, HttpServer};
use futures::future::FutureExt;
use tracing::{info, Level};

#[allow(clippy::cognitive_complexity)]
fn main() {
    let args: Vec<_> = std::env::args().collect();
    guard!(let [_, config_file_path, ..] = &args[..] else {
        eprintln!("First argument should be path to config file");
        return
    });

    let config = match Config::from_file(config_file_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e.internal);
            return;
        }
    };

    // Set up logger output
    let subscriber_builder = tracing_subscriber::fmt().with_max_level(Level::DEBUG);
    if config.human_logs {
        subscriber_builder.init();
    } else {
        subscriber_builder.json().init();
    }

    info!(backend = ?config.backend, "starting snapgram");

    let sys = actix_rt::System::new("snapgram");

    // Caches and in-flight mutations are shared by every worker.
    let queries = QueryClient::from_config(&config);

    info!(addr = &config.listen_address[..], "starting API server");
    let max_body_size = config.max_body_size;
    let app_config = config.clone();
    HttpServer::new(move || {
        // The HTTP client isn't Send, so each worker builds its own backend client.
        let backend = AppwriteClient::new(app_config.backend.clone());
        let state = api::State::new(
            Snapgram::new(backend, app_config.feed_limit),
            queries.clone(),
            app_config.max_upload_bytes,
        );
        App::new()
            // Middleware for Prometheus
            .wrap_fn(|request, srv| srv.call(request).map(increment_response_metrics))
            .data(state)
            // enable logger
            .wrap(middleware::Logger::default())
            // limit size of the payload (global configuration)
            .app_data(web::JsonConfig::default().limit(max_body_size))
            .configure(api::configure::<AppwriteClient>)
    })
    .bind(config.listen_address.clone())
    .expect("couldn't start API server")
    .run();

    // Start the metrics server
    info!(addr = &config.metrics_address[..], "starting metrics server");
    HttpServer::new(|| {
        App::new().service(
            web::scope("/metrics")
                .service(web::resource("/").route(web::get().to(metrics::endpoint::gather)))
                .service(web::resource("").route(web::get().to(metrics::endpoint::gather))),
        )
    })
    .bind(config.metrics_address)
    .expect("couldn't start metrics server")
    .run();

    sys.run().expect("actix runtime terminated");
}

/// If response is OK, increment the metrics for HTTP statuses.
fn increment_response_metrics<E, B>(
    response: Result<ServiceResponse<B>, E>,
) -> Result<ServiceResponse<B>, E> {
    match response {
        Ok(response) => {
            metrics::HTTP_RESPONSES
                .with_label_values(&[response.status().as_str()])
                .inc();
            Ok(response)
        }
        other => other,
    }
}
