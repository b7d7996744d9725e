//! REST adapter for the subscription, ride, and vehicle endpoints.

use super::{RideApi, RideRequest, SubscriptionApi, VehicleSource};
use crate::entitlement::{CreateSubscription, SubscriptionRecord};
use crate::error::{Result, TrackerError};
use crate::types::{Coordinates, RideId, UserId, VehicleSnapshot};
use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// HTTP client for the tracking backend.
///
/// Cloning shares the connection pool and the bearer token.
///
/// # Endpoints
///
/// | Operation | Request |
/// |-----------|---------|
/// | Read subscription | `GET {base}/subscriptions/{user}` |
/// | Create subscription | `POST {base}/subscriptions/{user}` |
/// | Submit ride | `POST {base}/rides` |
/// | Cancel ride | `POST {base}/rides/{ride}/cancel` |
/// | Nearby vehicles | `GET {base}/vehicles/nearby?lat=&lng=&radiusKm=` |
#[derive(Clone)]
pub struct RestClient {
    /// HTTP client for making requests.
    http: Client,

    /// API root, e.g. `https://api.example.com/api`.
    base: Url,

    /// Bearer token attached to every request once set.
    token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.token().is_some())
            .finish_non_exhaustive()
    }
}

/// The proximity endpoint answers with a bare array or `{ "vehicles": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum NearbyResponse {
    List(Vec<VehicleSnapshot>),
    Wrapped { vehicles: Vec<VehicleSnapshot> },
}

impl RestClient {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Invalid`] if the URL cannot be parsed or cannot
    /// carry a path, and a transient error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| TrackerError::Invalid(format!("API base URL {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(TrackerError::Invalid(format!(
                "API base URL {base_url:?} cannot carry a path"
            )));
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Replace the bearer token (or clear it on sign-out).
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let request = self.http.request(method, self.url(segments));
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = TrackerError::from_status(status.as_u16(), &body);
        tracing::debug!(status = status.as_u16(), kind = error.kind(), "Request rejected");
        Err(error)
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let body = Self::send(request).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl SubscriptionApi for RestClient {
    fn fetch_subscription(&self, user: &UserId) -> BoxFuture<'_, Result<SubscriptionRecord>> {
        let request = self.request(Method::GET, &["subscriptions", user.as_str()]);
        Box::pin(Self::send_json(request))
    }

    fn create_subscription(
        &self,
        user: &UserId,
        body: CreateSubscription,
    ) -> BoxFuture<'_, Result<SubscriptionRecord>> {
        let request = self
            .request(Method::POST, &["subscriptions", user.as_str()])
            .json(&body);
        Box::pin(Self::send_json(request))
    }
}

impl RideApi for RestClient {
    fn submit_ride(&self, body: RideRequest) -> BoxFuture<'_, Result<()>> {
        let request = self.request(Method::POST, &["rides"]).json(&body);
        Box::pin(async move {
            Self::send(request).await?;
            Ok(())
        })
    }

    fn cancel_ride(&self, ride_id: &RideId) -> BoxFuture<'_, Result<()>> {
        let request = self.request(Method::POST, &["rides", ride_id.as_str(), "cancel"]);
        Box::pin(async move {
            Self::send(request).await?;
            Ok(())
        })
    }
}

impl VehicleSource for RestClient {
    fn nearby_vehicles(
        &self,
        location: Coordinates,
        radius_km: f64,
    ) -> BoxFuture<'_, Result<Vec<VehicleSnapshot>>> {
        let request = self.request(Method::GET, &["vehicles", "nearby"]).query(&[
            ("lat", location.latitude.to_string()),
            ("lng", location.longitude.to_string()),
            ("radiusKm", radius_km.to_string()),
        ]);
        Box::pin(async move {
            Ok(match Self::send_json(request).await? {
                NearbyResponse::List(vehicles) | NearbyResponse::Wrapped { vehicles } => vehicles,
            })
        })
    }
}
