pub mod access_log;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod registry;
pub mod relay;
pub mod transform;

mod body;

use crate::errors::RelayError;
use crate::relay::{RelayBody, RelayEngine};
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Request, Response};
use shared::http::run_http_service;
use std::pin::Pin;
use std::sync::Arc;

/// Builds the relay engine from config and serves the front door until the
/// process exits.
pub async fn run(config: config::Config) -> Result<(), RelayError> {
    let engine = Arc::new(RelayEngine::new(&config)?);
    let service = RelayService::new(engine);
    run_http_service(&config.listener.host, config.listener.port, service).await
}

/// Front door: any method, any path, everything goes through the relay
/// engine. The engine owns all error handling, so this service never fails
/// a request.
pub struct RelayService {
    engine: Arc<RelayEngine>,
}

impl RelayService {
    pub fn new(engine: Arc<RelayEngine>) -> Self {
        Self { engine }
    }
}

impl Service<Request<Incoming>> for RelayService {
    type Response = Response<RelayBody>;
    type Error = RelayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let engine = self.engine.clone();
        Box::pin(async move { Ok(engine.handle(req).await) })
    }
}
