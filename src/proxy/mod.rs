//! 上游代理模块
//!
//! 提供全局代理与按会话代理支持，允许为每个 Notion 凭证配置独立的出口

mod client_factory;

pub use client_factory::{ClientCache, ProxyClientFactory, ProxyError, ProxyProtocol};
