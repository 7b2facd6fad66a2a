pub mod api;
pub mod transport;

use crate::tether::config::TetherConfig;
use anyhow::Result;
use tracing::debug;

pub use api::RemoteApi;
use transport::HttpTransport;

/// Build the HTTP-backed API from configuration.
pub fn connect(cfg: &TetherConfig) -> Result<RemoteApi> {
    let transport = HttpTransport::from_config(cfg)?;
    debug!(base_url = transport.base_url(), "remote transport ready");
    Ok(RemoteApi::new(Box::new(transport)))
}
