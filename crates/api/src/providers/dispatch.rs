use async_trait::async_trait;
use liveclass_core::errors::ClassResult;
use liveclass_core::models::{DispatchReceipt, Notification};
use liveclass_core::ports::NotificationDispatcher;
use reqwest::Client;

use super::upstream;
use crate::config::DispatchSettings;

/// Posts rendered notifications to the dispatch service.
pub struct HttpDispatcher {
    client: Client,
    url: String,
    token: String,
}

impl HttpDispatcher {
    pub fn new(settings: &DispatchSettings) -> Self {
        Self {
            client: Client::new(),
            url: settings.url.clone(),
            token: settings.token.clone(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for HttpDispatcher {
    async fn send(&self, notification: &Notification) -> ClassResult<DispatchReceipt> {
        let mut request = self.client.post(&self.url).json(notification);
        if !self.token.is_empty() {
            request = request.bearer_auth(&self.token);
        }

        let res = request.send().await.map_err(|e| upstream("dispatch", e))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(upstream("dispatch", format!("status {}, body: {}", status, text)));
        }

        res.json::<DispatchReceipt>().await.map_err(|e| upstream("dispatch", e))
    }
}
