//! Thread subscriptions and new-post notifications for Agora.

mod notifier;
mod repository;

pub use notifier::{
    DeliveryError, LogTransport, Notification, NotificationTransport, NotifyReport,
    SubscriptionNotifier,
};
pub use repository::{SubscriptionRepository, ThreadSubscription};
