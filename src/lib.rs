//! Agora - forum access control and discussion kernel
//!
//! Members and their forum standing, a pure access evaluator, the
//! forum/thread/post aggregate and a subscription notifier fanning out
//! new-post notifications.

pub mod access;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod forum;
pub mod hooks;
pub mod logging;
pub mod member;
pub mod render;
pub mod report;
pub mod session;
pub mod subscription;

pub use access::{AccessEvaluator, ForumScope, PostScope, ThreadScope};
pub use config::Config;
pub use db::{Database, DbPool};
pub use error::{AgoraError, Result};
pub use forum::{ForumService, Pagination, PaginatedResult};
pub use hooks::{ForumObserver, ObserverRegistry};
pub use member::{ForumStatus, Identity, MemberRepository, MemberService};
pub use report::{MonthlyCount, ReportRepository};
pub use session::{MemorySession, ViewerSession};
pub use subscription::{SubscriptionNotifier, SubscriptionRepository};
