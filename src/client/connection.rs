//! Lifecycle of the single upstream connection.
//!
//! Exactly one client handle is live at a time. The controller never touches
//! the handle across a recycle: the old one is closed and dropped, then a
//! fresh one is connected, optionally after a cool-down so the gap is
//! observable server-side.

use crate::client::error::ClientError;
use crate::client::{Connect, MeasurementClient};
use log::info;
use std::time::Duration;
use tokio::time::sleep;

pub struct ConnectionManager<C: Connect> {
    connector: C,
    client: Option<C::Client>,
}

impl<C: Connect> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            client: None,
        }
    }

    /// Returns the current client, connecting lazily on first use.
    pub async fn client(&mut self) -> Result<&mut C::Client, ClientError> {
        match &mut self.client {
            Some(client) => Ok(client),
            slot => Ok(slot.insert(self.connector.connect().await?)),
        }
    }

    /// Discards the current client (if any) and connects a fresh one.
    ///
    /// The old connection's resources are released before sleeping, so the
    /// cool-down shows up server-side as a real connection gap. With no prior
    /// client there is nothing to cool down from and the wait is skipped.
    pub async fn recycle(&mut self, delay: Duration) -> Result<&mut C::Client, ClientError> {
        if let Some(old) = self.client.take() {
            old.close().await;
            if !delay.is_zero() {
                info!("Cooling down {}s before reconnecting", delay.as_secs());
                sleep(delay).await;
            }
        }
        let fresh = self.connector.connect().await?;
        Ok(self.client.insert(fresh))
    }
}
