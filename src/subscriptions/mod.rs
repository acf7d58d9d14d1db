//! The subscription manager actor (spec §4.7): mirrors [`crate::store`]'s
//! single-writer design, owning every subscription's monitored-item set,
//! pending queue, and (at most one) attached SSE sender.

pub mod sse;

use crate::error::BridgeError;
use crate::model::{
    CreateSubscriptionRequest, ElementId, ObjectValue, SubscriptionId, SubscriptionInfo,
    DEFAULT_MAX_DEPTH, DEFAULT_QUEUE_HIGH_WATER_MARK,
};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

type Responder<T> = oneshot::Sender<T>;
/// Carries pre-rendered JSON frame bodies; [`sse`] wraps each one in an
/// `axum::response::sse::Event` on the way out.
type SseSender = mpsc::UnboundedSender<String>;

struct SubscriptionState {
    info: SubscriptionInfo,
    pending_queue: VecDeque<ObjectValue>,
    sse_sender: Option<SseSender>,
}

impl SubscriptionState {
    fn new(request: CreateSubscriptionRequest) -> Self {
        let subscription_id = Uuid::new_v4();
        SubscriptionState {
            info: SubscriptionInfo {
                subscription_id,
                created_at: Utc::now(),
                monitored_items: request.monitored_items,
                max_depth: request.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
                queue_high_water_mark: request.queue_high_water_mark.unwrap_or(DEFAULT_QUEUE_HIGH_WATER_MARK),
                pending_count: 0,
                sse_attached: false,
            },
            pending_queue: VecDeque::new(),
            sse_sender: None,
        }
    }

    fn refresh_pending_count(&mut self) {
        self.info.pending_count = self.pending_queue.len();
    }
}

#[derive(Debug)]
pub enum Command {
    Create { request: CreateSubscriptionRequest, resp: Responder<SubscriptionInfo> },
    Delete { id: SubscriptionId, resp: Responder<bool> },
    Get { id: SubscriptionId, resp: Responder<Option<SubscriptionInfo>> },
    List { resp: Responder<Vec<SubscriptionInfo>> },
    Register { id: SubscriptionId, element_ids: Vec<ElementId>, resp: Responder<Option<SubscriptionInfo>> },
    Unregister { id: SubscriptionId, element_ids: Vec<ElementId>, resp: Responder<Option<SubscriptionInfo>> },
    AttachSse { id: SubscriptionId, resp: Responder<Option<mpsc::UnboundedReceiver<String>>> },
    DetachSse { id: SubscriptionId },
    Notify { element_id: ElementId, value: ObjectValue },
    Sync { id: SubscriptionId, resp: Responder<Option<Vec<ObjectValue>>> },
}

pub async fn manager(mut rx: mpsc::Receiver<Command>) {
    let mut subscriptions: HashMap<SubscriptionId, SubscriptionState> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Create { request, resp } => {
                let state = SubscriptionState::new(request);
                let info = state.info.clone();
                subscriptions.insert(info.subscription_id, state);
                let _ = resp.send(info);
            }
            Command::Delete { id, resp } => {
                // best-effort: dropping the state drops its SseSender, which
                // ends any attached stream.
                let _ = resp.send(subscriptions.remove(&id).is_some());
            }
            Command::Get { id, resp } => {
                let _ = resp.send(subscriptions.get(&id).map(|s| s.info.clone()));
            }
            Command::List { resp } => {
                let _ = resp.send(subscriptions.values().map(|s| s.info.clone()).collect());
            }
            Command::Register { id, element_ids, resp } => {
                let result = subscriptions.get_mut(&id).map(|s| {
                    s.info.monitored_items.extend(element_ids);
                    s.info.clone()
                });
                let _ = resp.send(result);
            }
            Command::Unregister { id, element_ids, resp } => {
                let result = subscriptions.get_mut(&id).map(|s| {
                    for element_id in &element_ids {
                        s.info.monitored_items.remove(element_id);
                    }
                    s.info.clone()
                });
                let _ = resp.send(result);
            }
            Command::AttachSse { id, resp } => {
                let result = subscriptions.get_mut(&id).map(|s| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    // overwriting the old sender (if any) drops it, which ends
                    // the previous stream: "attaching a second ends the first".
                    s.sse_sender = Some(tx);
                    s.info.sse_attached = true;
                    rx
                });
                let _ = resp.send(result);
            }
            Command::DetachSse { id } => {
                if let Some(s) = subscriptions.get_mut(&id) {
                    s.sse_sender = None;
                    s.info.sse_attached = false;
                }
            }
            Command::Notify { element_id, value } => {
                for s in subscriptions.values_mut() {
                    if !s.info.monitored_items.contains(&element_id) {
                        continue;
                    }
                    if s.pending_queue.len() >= s.info.queue_high_water_mark && s.info.queue_high_water_mark > 0 {
                        s.pending_queue.pop_front();
                    }
                    s.pending_queue.push_back(value.clone());
                    s.refresh_pending_count();

                    if let Some(sender) = &s.sse_sender {
                        let frame = sse::render_frame(&element_id, &value);
                        if sender.send(frame).is_err() {
                            s.sse_sender = None;
                            s.info.sse_attached = false;
                        }
                    }
                }
            }
            Command::Sync { id, resp } => {
                let result = subscriptions.get_mut(&id).map(|s| {
                    let drained: Vec<ObjectValue> = s.pending_queue.drain(..).collect();
                    s.refresh_pending_count();
                    drained
                });
                let _ = resp.send(result);
            }
        }
    }
}

/// A cheap, cloneable handle to the subscription actor.
#[derive(Clone)]
pub struct SubscriptionManager {
    tx: mpsc::Sender<Command>,
}

impl SubscriptionManager {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(manager(rx));
        Self { tx }
    }

    async fn call<T>(&self, build: impl FnOnce(Responder<T>) -> Command) -> Result<T, BridgeError> {
        let (resp, recv) = oneshot::channel();
        self.tx.send(build(resp)).await?;
        Ok(recv.await?)
    }

    pub async fn create(&self, request: CreateSubscriptionRequest) -> Result<SubscriptionInfo, BridgeError> {
        self.call(|resp| Command::Create { request, resp }).await
    }

    pub async fn delete(&self, id: SubscriptionId) -> Result<bool, BridgeError> {
        self.call(|resp| Command::Delete { id, resp }).await
    }

    pub async fn get(&self, id: SubscriptionId) -> Result<Option<SubscriptionInfo>, BridgeError> {
        self.call(|resp| Command::Get { id, resp }).await
    }

    pub async fn list(&self) -> Result<Vec<SubscriptionInfo>, BridgeError> {
        self.call(|resp| Command::List { resp }).await
    }

    pub async fn register(&self, id: SubscriptionId, element_ids: Vec<ElementId>) -> Result<Option<SubscriptionInfo>, BridgeError> {
        self.call(|resp| Command::Register { id, element_ids, resp }).await
    }

    pub async fn unregister(&self, id: SubscriptionId, element_ids: Vec<ElementId>) -> Result<Option<SubscriptionInfo>, BridgeError> {
        self.call(|resp| Command::Unregister { id, element_ids, resp }).await
    }

    pub async fn attach_sse(&self, id: SubscriptionId) -> Result<Option<mpsc::UnboundedReceiver<String>>, BridgeError> {
        self.call(|resp| Command::AttachSse { id, resp }).await
    }

    pub async fn detach_sse(&self, id: SubscriptionId) -> Result<(), BridgeError> {
        Ok(self.tx.send(Command::DetachSse { id }).await?)
    }

    pub async fn notify(&self, element_id: ElementId, value: ObjectValue) -> Result<(), BridgeError> {
        Ok(self.tx.send(Command::Notify { element_id, value }).await?)
    }

    pub async fn sync(&self, id: SubscriptionId) -> Result<Option<Vec<ObjectValue>>, BridgeError> {
        self.call(|resp| Command::Sync { id, resp }).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;

    fn req(items: &[&str]) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            monitored_items: items.iter().map(|s| s.to_string()).collect(),
            max_depth: None,
            queue_high_water_mark: Some(3),
        }
    }

    #[tokio::test]
    async fn queue_drops_oldest_beyond_high_water_mark() {
        // P5, scenario 4
        let mgr = SubscriptionManager::spawn();
        let info = mgr.create(req(&["x.y"])).await.unwrap();

        for i in 0..5 {
            mgr.notify("x.y".to_string(), ObjectValue::new("x.y", Value::Number(i as f64), Utc::now()))
                .await
                .unwrap();
        }

        let drained = mgr.sync(info.subscription_id).await.unwrap().expect("exists");
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].value, Value::Number(2.0));
        assert_eq!(drained[2].value, Value::Number(4.0));
    }

    #[tokio::test]
    async fn sync_drains_and_subsequent_sync_is_empty() {
        // P6
        let mgr = SubscriptionManager::spawn();
        let info = mgr.create(req(&["a"])).await.unwrap();
        mgr.notify("a".to_string(), ObjectValue::new("a", Value::Bool(true), Utc::now()))
            .await
            .unwrap();

        let first = mgr.sync(info.subscription_id).await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        let second = mgr.sync(info.subscription_id).await.unwrap().unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn sync_on_unknown_subscription_is_none() {
        let mgr = SubscriptionManager::spawn();
        assert!(mgr.sync(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_monitored_items_means_notify_is_a_noop() {
        let mgr = SubscriptionManager::spawn();
        let info = mgr.create(req(&[])).await.unwrap();
        mgr.notify("whatever".to_string(), ObjectValue::new("whatever", Value::Null, Utc::now()))
            .await
            .unwrap();
        let drained = mgr.sync(info.subscription_id).await.unwrap().unwrap();
        assert!(drained.is_empty());
    }

    #[tokio::test]
    async fn attaching_second_sse_connection_ends_the_first() {
        let mgr = SubscriptionManager::spawn();
        let info = mgr.create(req(&["a"])).await.unwrap();
        let mut first = mgr.attach_sse(info.subscription_id).await.unwrap().unwrap();
        let _second = mgr.attach_sse(info.subscription_id).await.unwrap().unwrap();

        mgr.notify("a".to_string(), ObjectValue::new("a", Value::Bool(true), Utc::now()))
            .await
            .unwrap();
        // first's sender was dropped when the subscription's sse_sender was
        // overwritten, so its receiver now observes a closed channel.
        assert!(first.recv().await.is_none());
    }

    #[tokio::test]
    async fn delete_removes_subscription_and_its_queue() {
        let mgr = SubscriptionManager::spawn();
        let info = mgr.create(req(&["a"])).await.unwrap();
        assert!(mgr.delete(info.subscription_id).await.unwrap());
        assert!(mgr.get(info.subscription_id).await.unwrap().is_none());
    }
}
