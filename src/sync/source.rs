//! Where the display client reads avatar state from.

use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::{Catalog, Expression};
use crate::errors::AvatarError;
use crate::state::types::{AvatarView, ExpressionPayload};
use crate::state::AvatarStateStore;

/// A readable feed of store snapshots.
#[async_trait]
pub trait ViewSource: Send + Sync {
    async fn fetch_view(&self) -> Result<AvatarView, AvatarError>;
}

#[async_trait]
impl ViewSource for AvatarStateStore {
    async fn fetch_view(&self) -> Result<AvatarView, AvatarError> {
        Ok(self.current_view())
    }
}

#[async_trait]
impl<S: ViewSource + ?Sized> ViewSource for Arc<S> {
    async fn fetch_view(&self) -> Result<AvatarView, AvatarError> {
        (**self).fetch_view().await
    }
}

/// Reads state from a running server over HTTP.
#[derive(Debug, Clone)]
pub struct HttpViewSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpViewSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the server's expression list, for resolving batch frames locally.
    pub async fn fetch_catalog(&self) -> Result<Catalog, AvatarError> {
        let response = self
            .client
            .get(format!("{}/expressions", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AvatarError::TransportUnavailable(format!(
                "GET /expressions returned {}",
                response.status()
            )));
        }
        let expressions: Vec<Expression> = response.json().await?;
        Ok(Catalog::from_expressions(expressions))
    }
}

#[async_trait]
impl ViewSource for HttpViewSource {
    async fn fetch_view(&self) -> Result<AvatarView, AvatarError> {
        let response = self
            .client
            .get(format!("{}/currentExpression", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AvatarError::TransportUnavailable(format!(
                "GET /currentExpression returned {}",
                response.status()
            )));
        }
        let payload: ExpressionPayload = response.json().await?;
        Ok(payload.into_view())
    }
}
