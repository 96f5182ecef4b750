// 事件总线
//
// 基于 tokio broadcast：发布方不阻塞，订阅方落后太多时会收到 Lagged

use super::UploadEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// 默认通道容量
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// 上传事件总线
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<UploadEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 订阅事件，只能收到订阅之后发布的事件
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.sender.subscribe()
    }

    /// 发布事件，没有订阅者时直接丢弃
    pub fn publish(&self, event: UploadEvent) {
        trace!("发布事件: {}", event.event_type_name());
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::default();
        // 无订阅者时发布不报错
        bus.publish(UploadEvent::Paused);

        let mut rx = bus.subscribe();
        assert_eq!(bus.sender.receiver_count(), 1);
        bus.publish(UploadEvent::Resumed);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, UploadEvent::Resumed));
        assert!(rx.try_recv().is_err());
    }
}
