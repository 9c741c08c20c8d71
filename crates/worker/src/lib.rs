//! Worker端的调度协议客户端与执行循环
//!
//! [`SchedulerClient`] 封装三条Worker协议（轮询、上报、心跳），
//! [`WorkerAgent`] 在其上运行心跳循环和轮询循环，具体的扫描执行由
//! 调用方实现 [`TaskRunner`] 注入。

pub mod agent;
pub mod client;

pub use agent::{AgentConfig, TaskOutcome, TaskRunner, WorkerAgent};
pub use client::SchedulerClient;
