use super::ElementId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub type SubscriptionId = Uuid;

pub const DEFAULT_QUEUE_HIGH_WATER_MARK: usize = 10_000;
/// `0` means "unspecified depth" per spec §4.7.
pub const DEFAULT_MAX_DEPTH: u32 = 0;

/// The admin/REST-facing view of a subscription: everything except the
/// actual queue contents, which only `sync` exposes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub subscription_id: SubscriptionId,
    pub created_at: DateTime<Utc>,
    pub monitored_items: BTreeSet<ElementId>,
    pub max_depth: u32,
    pub queue_high_water_mark: usize,
    pub pending_count: usize,
    pub sse_attached: bool,
}

/// What a `POST /subscriptions` call accepts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    #[serde(default)]
    pub monitored_items: BTreeSet<ElementId>,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub queue_high_water_mark: Option<usize>,
}

/// Placeholder re-export so callers can refer to `model::Subscription` for
/// the full live state without reaching into `subscriptions::actor`
/// internals; the actual mutable state (queue, SSE sender) is owned by the
/// subscription actor and never handed out.
pub type Subscription = SubscriptionInfo;
