//! 基础设施层（Infrastructure Layer）
//!
//! 持有外部资源（网关、本地缓存、认证提供方），只暴露能力，不认识业务流程。

pub mod auth;
pub mod cache;
pub mod gateway;
pub mod live;

pub use auth::{AuthProvider, LocalAuthProvider};
pub use cache::{DirCache, LocalCache, MemoryCache};
pub use gateway::{Collection, MemoryGateway, PersistenceGateway, StoredDoc};
pub use live::LiveCollection;
