//! `POST/GET/DELETE /subscriptions*` (spec §4.7, §6): subscription CRUD,
//! register/unregister, drain-sync, and the SSE stream. The stream handler
//! owns a [`DetachGuard`] so a client disconnect reliably calls
//! `detachSse` even though axum just drops the response body — the same
//! "cleanup lives in `Drop`, not in a cancellation branch" idiom the store
//! and subscription actors already use for their `mpsc` shutdown.

use super::objects::ElementIdsRequest;
use super::{parse_subscription_id, ApiError, AppState};
use crate::model::{CreateSubscriptionRequest, ObjectValue, SubscriptionId, SubscriptionInfo};
use crate::subscriptions::SubscriptionManager;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::{stream, Stream, StreamExt};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::wrappers::UnboundedReceiverStream;

#[utoipa::path(post, path = "/subscriptions", tag = "subscriptions", responses((status = 201, description = "Subscription created")))]
pub async fn create_subscription(
    State(state): State<AppState>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionInfo>), ApiError> {
    let info = state.subscriptions.create(request).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

#[utoipa::path(get, path = "/subscriptions", tag = "subscriptions", responses((status = 200, description = "All subscriptions")))]
pub async fn list_subscriptions(State(state): State<AppState>) -> Result<Json<Vec<SubscriptionInfo>>, ApiError> {
    Ok(Json(state.subscriptions.list().await?))
}

pub async fn get_subscription(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<SubscriptionInfo>, ApiError> {
    let id = parse_subscription_id(&id)?;
    state
        .subscriptions
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no such subscription: {id}")))
}

pub async fn delete_subscription(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let id = parse_subscription_id(&id)?;
    if state.subscriptions.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no such subscription: {id}")))
    }
}

pub async fn register_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ElementIdsRequest>,
) -> Result<Json<SubscriptionInfo>, ApiError> {
    let id = parse_subscription_id(&id)?;
    state
        .subscriptions
        .register(id, request.element_ids)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no such subscription: {id}")))
}

pub async fn unregister_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ElementIdsRequest>,
) -> Result<Json<SubscriptionInfo>, ApiError> {
    let id = parse_subscription_id(&id)?;
    state
        .subscriptions
        .unregister(id, request.element_ids)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no such subscription: {id}")))
}

pub async fn sync_subscription(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<ObjectValue>>, ApiError> {
    let id = parse_subscription_id(&id)?;
    state
        .subscriptions
        .sync(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no such subscription: {id}")))
}

/// Runs `detachSse` from the destructor, so it fires whether the stream
/// ends because the client went away, the response was dropped mid-poll,
/// or axum cancelled the handler outright.
struct DetachGuard {
    subscriptions: SubscriptionManager,
    id: SubscriptionId,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        let subscriptions = self.subscriptions.clone();
        let id = self.id;
        tokio::spawn(async move {
            let _ = subscriptions.detach_sse(id).await;
        });
    }
}

struct GuardedStream<S> {
    inner: S,
    _guard: DetachGuard,
}

impl<S: Stream + Unpin> Stream for GuardedStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_next(cx)
    }
}

/// `GET /subscriptions/{id}/stream`: `text/event-stream`, an initial
/// `: connected` comment, then one `data:` frame per notified change.
pub async fn stream_subscription(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let id = parse_subscription_id(&id)?;
    let Some(receiver) = state.subscriptions.attach_sse(id).await? else {
        return Err(ApiError::not_found(format!("no such subscription: {id}")));
    };

    let guard = DetachGuard { subscriptions: state.subscriptions.clone(), id };
    let frames = UnboundedReceiverStream::new(receiver).map(|frame| Ok::<_, Infallible>(Event::default().data(frame)));
    let guarded = GuardedStream { inner: frames, _guard: guard };
    let connected = stream::once(async { Ok::<_, Infallible>(Event::default().comment("connected")) });

    Ok(Sse::new(connected.chain(guarded)).keep_alive(KeepAlive::default()))
}
