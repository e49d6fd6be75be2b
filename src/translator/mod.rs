//! 协议转换层
//!
//! 处理 OpenAI 前端协议与 Notion 后端之间的请求格式转换。
//! 响应方向由 `stream` 模块负责（`StreamEvent` → OpenAI SSE）。
//!
//! # 架构设计
//!
//! ```text
//! translator/
//! ├── traits.rs              # SSE 转换 trait 与转换错误
//! └── notion/                # Notion 后端
//!     ├── request.rs         # OpenAI → transcript 请求
//!     └── continuity.rs      # thread id 标记的嵌入、提取与清除
//! ```
//!
//! # 使用示例
//!
//! ```ignore
//! use notioncast_lib::translator::notion::{continuity, NotionRequestTranslator};
//!
//! let thread_id = continuity::extract(&request.messages);
//! let translator = NotionRequestTranslator::new("apple-danish", "Asia/Shanghai");
//! let built = translator.build(&request, Some(&session), thread_id.as_deref())?;
//! ```

pub mod notion;
pub mod traits;

// 重新导出核心类型
pub use notion::{NotionRequest, NotionRequestTranslator};
pub use traits::{SseResponseTranslator, TranslateError, TranslateErrorKind};
