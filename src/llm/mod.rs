//! 生成传输边界：客户端抽象与测试实现（Mock）
//!
//! 真正的模型调用由宿主提供，crate 只依赖 GenerationClient。

pub mod mock;
pub mod traits;

pub use mock::MockGenerationClient;
pub use traits::{GenerationClient, GenerationRequest};
