//! 事件模块
//!
//! 队列和传输的状态变化通过事件总线发布，显示层只需订阅
//! - `types.rs`: 事件类型定义
//! - `bus.rs`: 基于 broadcast 的事件总线

mod bus;
mod types;

pub use bus::*;
pub use types::*;
