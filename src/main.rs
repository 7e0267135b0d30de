//! Scene Tracker 命令行
//!
//! 入口：加载配置、初始化日志，对追踪器文件执行调和、渲染与聊天记录操作。
//! 输入路径为 `-` 时从标准输入读取。

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use scene_tracker::chat::InMemoryChat;
use scene_tracker::commands::{get_tracker_command, save_tracker_to_message_command};
use scene_tracker::config::load_config;
use scene_tracker::format::TrackerOutput;
use scene_tracker::observability::init_tracing;
use scene_tracker::reconcile::{
    clean_tracker, get_default_tracker, get_example_trackers, get_tracker, get_tracker_prompt,
    tracker_exists, update_tracker,
};
use scene_tracker::render::{render_template, render_view};
use scene_tracker::schema::Preset;
use scene_tracker::{IncludeFilter, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "scene-tracker")]
#[command(version, about = "Schema-driven scene tracker tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 额外的配置文件（覆盖 config/scene-tracker.toml）
    #[arg(short, long, global = true, env = "SCENE_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// 预设名（默认取配置中的 selected_preset）
    #[arg(short, long, global = true)]
    preset: Option<String>,

    /// 字段过滤：dynamic / static / all
    #[arg(short, long, global = true, default_value = "all")]
    include: IncludeFilter,

    /// 输出格式：json / yaml（默认取配置中的 tracker_format）
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 打印默认追踪器
    Default,

    /// 打印全部示例追踪器
    Examples,

    /// 打印字段提示文本
    Prompt,

    /// 按 Schema 规范化追踪器
    Get {
        input: PathBuf,

        /// 丢弃 Schema 之外的字段
        #[arg(long)]
        drop_unmatched: bool,
    },

    /// 把新追踪器合并到已有追踪器上
    Update {
        existing: PathBuf,
        new: PathBuf,

        /// `_extraFields` 只取新追踪器的
        #[arg(long)]
        prefer_new: bool,
    },

    /// 移除与默认值相同的部分
    Clean {
        input: PathBuf,

        /// 保留结构，被移除的值置空
        #[arg(long)]
        preserve_structure: bool,
    },

    /// 追踪器是否包含默认值以外的内容（退出码 1 表示不包含）
    Exists { input: PathBuf },

    /// 用展示模板或层级视图渲染追踪器
    Render {
        input: PathBuf,

        /// 模板文件（默认取预设的展示模板）
        #[arg(short, long)]
        template: Option<PathBuf>,

        /// 输出缩进纯文本视图而不是模板
        #[arg(long, conflicts_with = "template")]
        view: bool,
    },

    /// 打印预设捆绑的 JSON Schema
    Schema,

    /// 读取聊天记录中某条消息的追踪器
    ChatGet {
        chat: PathBuf,

        /// 消息索引（默认最后一条非系统消息）
        #[arg(short = 'm', long)]
        message: Option<usize>,
    },

    /// 把追踪器合并保存到聊天记录中的某条消息
    ChatSave {
        chat: PathBuf,
        tracker: PathBuf,

        #[arg(short = 'm', long)]
        message: Option<usize>,
    },
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_output(output: &TrackerOutput) {
    println!("{}", output.to_text());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.clone()).context("Failed to load config")?;
    let mut settings = config.tracker;
    init_tracing(settings.debug_mode);

    let store = settings.preset_store().context("Failed to load presets")?;
    if let Some(name) = &cli.preset {
        settings.selected_preset = name.clone();
    }
    let preset = settings
        .active_preset(&store)
        .context("Failed to select preset")?
        .clone();
    let schema = &preset.tracker_def;
    let format = cli.format.unwrap_or(settings.tracker_format);
    tracing::debug!(preset = %preset.name, ?format, include = ?cli.include, "Running command");

    match cli.command {
        Command::Default => print_output(&get_default_tracker(schema, cli.include, format)),
        Command::Examples => {
            for example in get_example_trackers(schema, cli.include, format) {
                println!("{}\n", example.to_text());
            }
        }
        Command::Prompt => println!("{}", get_tracker_prompt(schema, cli.include)),
        Command::Get {
            input,
            drop_unmatched,
        } => {
            let text = read_input(&input)?;
            print_output(&get_tracker(text, schema, cli.include, !drop_unmatched, format));
        }
        Command::Update {
            existing,
            new,
            prefer_new,
        } => {
            let existing = read_input(&existing)?;
            let new = read_input(&new)?;
            print_output(&update_tracker(existing, new, schema, true, format, prefer_new));
        }
        Command::Clean {
            input,
            preserve_structure,
        } => {
            let text = read_input(&input)?;
            print_output(&clean_tracker(text, schema, format, preserve_structure));
        }
        Command::Exists { input } => {
            let text = read_input(&input)?;
            let tracker = get_tracker(text, schema, IncludeFilter::All, true, OutputFormat::Json)
                .into_record();
            let exists = tracker_exists(Some(&tracker), schema);
            println!("{exists}");
            if !exists {
                std::process::exit(1);
            }
        }
        Command::Render {
            input,
            template,
            view,
        } => {
            let text = read_input(&input)?;
            let tracker = get_tracker(text, schema, IncludeFilter::All, true, OutputFormat::Json)
                .into_record();
            if view {
                println!("{}", render_view(&tracker, schema).to_text());
            } else {
                let template = match template {
                    Some(path) => read_input(&path)?,
                    None => preset.mes_tracker_template.clone(),
                };
                println!("{}", render_template(&tracker, &template)?);
            }
        }
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&Preset::json_schema())?);
        }
        Command::ChatGet { chat, message } => {
            let log = InMemoryChat::load(&chat)?;
            println!("{}", get_tracker_command(&log, schema, message)?);
        }
        Command::ChatSave {
            chat,
            tracker,
            message,
        } => {
            let mut log = InMemoryChat::load(&chat)?;
            let text = read_input(&tracker)?;
            let saved = save_tracker_to_message_command(&mut log, schema, message, &text)?;
            log.save(&chat)
                .with_context(|| format!("Failed to save {}", chat.display()))?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
    }

    Ok(())
}
