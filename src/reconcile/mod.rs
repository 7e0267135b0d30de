//! 调和：默认值、示例、规范化、合并、清理与提示文本
//!
//! 公开操作都是纯函数，按参数接收过滤器与输出格式。

pub mod clean;
pub mod engine;
pub mod extra;
pub mod handlers;

pub use clean::{clean_tracker, tracker_exists};
pub use engine::{
    default_record, get_default_tracker, get_example_trackers, get_tracker, get_tracker_prompt,
    update_tracker,
};
pub use extra::{merge_extra_fields, EXTRA_FIELDS_KEY};
pub use handlers::{Walk, PLACEHOLDER};
