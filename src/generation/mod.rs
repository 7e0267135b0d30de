//! 生成编排：提示组装、载荷提取、连接配置切换与 `TrackerGenerator`

pub mod extract;
pub mod orchestrator;
pub mod profile;
pub mod prompts;

pub use extract::{extract_payload, parse_generated, unescape_json_string};
pub use orchestrator::{
    TrackerGenerator, GENERATION_FAILED_NOTICE, MUTEX_OWNER, PARSE_FAILED_NOTICE,
};
pub use profile::{MockProfileSwitcher, NoopProfileSwitcher, ProfileSnapshot, ProfileSwitcher};
pub use prompts::{join_names, tracker_examples, CharacterCard, PromptBuilder, SceneCast};
