use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use clap::Parser as _;
use kube::CustomResourceExt as _;
use prometheus::{Encoder, TextEncoder};

pub use controller::{self, api::cluster::Cluster, settings::Settings, telemetry, State};

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&metrics, &mut buffer) {
        Ok(()) => HttpResponse::Ok().body(buffer),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    if settings.crd {
        print!("{}", serde_yaml::to_string(&Cluster::crd())?);
        return Ok(());
    }

    telemetry::init().await?;

    // Init k8s controller state
    let state = State::new();
    let bind_address = settings.bind_address.clone();
    let cluster_controller = controller::run_cluster_controller(state.clone(), settings);

    // Start web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
    })
    .bind(bind_address)?
    .shutdown_timeout(5)
    .run();

    // Either one stopping takes the process down
    tokio::select! {
        result = cluster_controller => result?,
        result = server => result?,
    }
    Ok(())
}
