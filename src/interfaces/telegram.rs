use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, ChatAction, ChatId, InputFile};
use tracing::{error, info};

use crate::core::auth::AuthorizationGate;
use crate::core::config::ConfigHandle;
use crate::core::executor::{CommandExecutor, CommandOrigin};
use crate::core::gpio::{GpioController, PinLevel};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::metrics;
use crate::core::motion::MotionGate;
use crate::core::notify::Notifier;
use crate::core::scheduler::Scheduler;
use crate::core::store::EventStore;
use crate::core::store::types::EventType;
use crate::interfaces::camera::Camera;
use crate::platform::{NativePlatform, Platform};

/// Longest reply body Telegram accepts comfortably. Command output beyond
/// this is cut for transport; the executor's own capture cap is separate.
const REPLY_OUTPUT_LIMIT: usize = 3900;

async fn transcribe_audio(api_key: &str, buf: Vec<u8>) -> Result<String> {
    let client = reqwest::Client::new();
    let file = reqwest::multipart::Part::bytes(buf)
        .file_name("audio.ogg")
        .mime_str("audio/ogg")?;

    let form = reqwest::multipart::Form::new()
        .text("model", "whisper-1")
        .part("file", file);

    let res = client
        .post("https://api.openai.com/v1/audio/transcriptions")
        .header("Authorization", format!("Bearer {}", api_key))
        .multipart(form)
        .send()
        .await?;

    if !res.status().is_success() {
        return Err(anyhow::anyhow!("Whisper API error: {}", res.text().await?));
    }

    let parsed: serde_json::Value = res.json().await?;
    if let Some(text) = parsed.get("text").and_then(|t| t.as_str()) {
        Ok(text.to_string())
    } else {
        Err(anyhow::anyhow!("No text in Whisper response"))
    }
}

/// Everything a message handler needs, cheap to clone into the repl closure.
#[derive(Clone)]
struct BotContext {
    config: ConfigHandle,
    store: Arc<EventStore>,
    auth: Arc<AuthorizationGate>,
    executor: Arc<CommandExecutor>,
    scheduler: Arc<Scheduler>,
    motion: Arc<MotionGate>,
    gpio: Arc<GpioController>,
    camera: Arc<Camera>,
}

pub struct TelegramInterface {
    bot: Bot,
    ctx: BotContext,
}

impl TelegramInterface {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ConfigHandle,
        store: Arc<EventStore>,
        auth: Arc<AuthorizationGate>,
        executor: Arc<CommandExecutor>,
        scheduler: Arc<Scheduler>,
        motion: Arc<MotionGate>,
        gpio: Arc<GpioController>,
        camera: Arc<Camera>,
    ) -> Self {
        let bot = Bot::new(config.snapshot().telegram.token.clone());
        Self {
            bot,
            ctx: BotContext {
                config,
                store,
                auth,
                executor,
                scheduler,
                motion,
                gpio,
                camera,
            },
        }
    }

    /// Alert sink broadcasting to every authorized operator.
    pub fn notifier(&self) -> TelegramNotifier {
        TelegramNotifier {
            bot: self.bot.clone(),
            config: self.ctx.config.clone(),
        }
    }

    async fn start_bot(&self) -> Result<()> {
        let bot_client = self.bot.clone();

        let commands = vec![
            BotCommand::new("help", "Show all available commands"),
            BotCommand::new("status", "System status report"),
            BotCommand::new("photo", "Capture a photo now"),
            BotCommand::new("motion", "Toggle motion detection"),
            BotCommand::new("events", "Recent security events"),
            BotCommand::new("run", "Run a whitelisted command"),
            BotCommand::new("schedule", "Schedule a daily command (HH:MM)"),
            BotCommand::new("tasks", "List scheduled tasks"),
            BotCommand::new("cancel", "Cancel a scheduled task"),
            BotCommand::new("gpio", "Drive a GPIO pin on|off"),
            BotCommand::new("reboot", "Reboot the system"),
        ];
        if let Err(e) = bot_client.set_my_commands(commands).await {
            error!("Failed to set telegram bot commands: {}", e);
        }

        let ctx = self.ctx.clone();

        tokio::spawn(async move {
            teloxide::repl(bot_client, move |bot: Bot, msg: Message| {
                let ctx = ctx.clone();
                async move {
                    let Some(user) = msg.from.clone() else {
                        return Ok(());
                    };
                    let identity = user.id.0 as i64;
                    let chat = msg.chat.id;

                    // Authorization comes before anything else, voice included.
                    if ctx.auth.require(identity).await.is_err() {
                        let _ = bot
                            .send_message(chat, "⛔ Access denied. You are not authorized.")
                            .await;
                        return Ok(());
                    }

                    let mut final_text = msg.text().map(str::to_string);

                    if final_text.is_none()
                        && let Some(voice) = msg.voice()
                    {
                        let Some(stt_key) = ctx.config.snapshot().telegram.stt_api_key.clone()
                        else {
                            let _ = bot
                                .send_message(
                                    chat,
                                    "🎤 Voice commands are disabled: no transcription key configured.",
                                )
                                .await;
                            return Ok(());
                        };

                        let _ = bot.send_chat_action(chat, ChatAction::Typing).await;

                        match bot.get_file(voice.file.id.clone()).await {
                            Ok(file) => {
                                let mut buf = vec![];
                                if let Err(e) = bot.download_file(&file.path, &mut buf).await {
                                    error!("Failed to download voice message: {}", e);
                                    let _ = bot
                                        .send_message(chat, "❌ Failed to download voice message.")
                                        .await;
                                    return Ok(());
                                }
                                match transcribe_audio(&stt_key, buf).await {
                                    Ok(transcribed) => {
                                        info!("Transcribed voice command: {}", transcribed);
                                        let _ = bot
                                            .send_message(
                                                chat,
                                                format!("🎤 Recognized: {transcribed}"),
                                            )
                                            .await;
                                        final_text = Some(transcribed);
                                    }
                                    Err(e) => {
                                        error!("Failed to transcribe audio: {}", e);
                                        let _ = bot
                                            .send_message(
                                                chat,
                                                "❌ Failed to transcribe voice message.",
                                            )
                                            .await;
                                        return Ok(());
                                    }
                                }
                            }
                            Err(e) => {
                                error!("Failed to get voice file info: {}", e);
                                let _ =
                                    bot.send_message(chat, "❌ Failed to access voice message.").await;
                                return Ok(());
                            }
                        }
                    }

                    if let Some(text) = final_text {
                        ctx.handle_command(&bot, chat, identity, text.trim()).await;
                    }
                    Ok(())
                }
            })
            .await;
        });
        Ok(())
    }
}

impl BotContext {
    async fn handle_command(&self, bot: &Bot, chat: ChatId, identity: i64, text: &str) {
        if text == "/start" || text == "/help" {
            let operators = self.config.snapshot().telegram.authorized_users.len();
            let help_text = format!(
                "\
🛡 vigil — home security controller

🔹 Monitoring
/status — System status report
/photo — Capture a photo now
/motion — Toggle motion detection
/events — Recent security events

🔹 Commands
/run <command> — Run a whitelisted command
📎 Send a voice note to run a command by voice

🔹 Scheduling
/schedule HH:MM <command> — Schedule a daily command
/tasks — List scheduled tasks
/cancel <id> — Cancel a scheduled task

🔹 Hardware
/gpio <pin> on|off — Drive a GPIO pin
/reboot — Reboot the system

✅ Authorized operators: {operators}"
            );
            let _ = bot.send_message(chat, help_text).await;
            return;
        }

        if text == "/status" {
            let _ = bot.send_chat_action(chat, ChatAction::Typing).await;
            let status = metrics::snapshot().await;
            let motion_state = if self.motion.is_enabled().await {
                "✅ active"
            } else {
                "❌ inactive"
            };
            let tasks = self.scheduler.list().await.map(|t| t.len()).unwrap_or(0);
            let field = |value: Option<String>| value.unwrap_or_else(|| "n/a".to_string());
            let report = format!(
                "\
📊 System Status

🌡 Temperature: {}
⏰ Uptime: {}
🌐 IP: {}
🖥 Host: {}
💾 Memory: {}
💿 Disk: {}

🎥 Motion detection: {}
📋 Active tasks: {}
🕐 {}",
                field(status.temperature),
                field(status.uptime),
                field(status.local_ip),
                field(status.hostname),
                field(status.memory),
                field(status.disk),
                motion_state,
                tasks,
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            );
            let _ = bot.send_message(chat, report).await;
            return;
        }

        if text == "/photo" {
            let _ = bot.send_chat_action(chat, ChatAction::UploadPhoto).await;
            match self.camera.capture().await {
                Ok(path) => {
                    let caption =
                        format!("📸 Photo captured\n🕐 {}", chrono::Local::now().format("%H:%M:%S"));
                    if let Err(e) = bot
                        .send_photo(chat, InputFile::file(path.clone()))
                        .caption(caption)
                        .await
                    {
                        error!("failed to send photo {}: {}", path.display(), e);
                        let _ = bot.send_message(chat, "❌ Captured, but sending failed.").await;
                    }
                }
                Err(e) => {
                    let _ = bot.send_message(chat, format!("❌ Capture failed: {e}")).await;
                }
            }
            return;
        }

        if text == "/motion" {
            let enable = !self.motion.is_enabled().await;
            match self.motion.set_enabled(enable, identity).await {
                Ok(()) if enable => {
                    let _ = bot
                        .send_message(
                            chat,
                            "✅ Motion detection ON\n🚨 You will receive automatic alerts.",
                        )
                        .await;
                }
                Ok(()) => {
                    let _ = bot.send_message(chat, "❌ Motion detection OFF").await;
                }
                Err(e) => {
                    let _ = bot.send_message(chat, format!("❌ {e}")).await;
                }
            }
            return;
        }

        if text == "/events" {
            match self.store.recent_events(10).await {
                Ok(events) if events.is_empty() => {
                    let _ = bot.send_message(chat, "📋 No security events recorded.").await;
                }
                Ok(events) => {
                    let mut reply = String::from("🔐 Recent Security Events\n\n");
                    for event in events {
                        reply.push_str(&format!(
                            "• #{} {}\n  {}\n  🕐 {}\n",
                            event.id, event.event_type, event.description, event.timestamp
                        ));
                        if let Some(photo) = &event.photo_path {
                            reply.push_str(&format!("  📷 {photo}\n"));
                        }
                        reply.push('\n');
                    }
                    let _ = bot.send_message(chat, reply).await;
                }
                Err(e) => {
                    let _ = bot.send_message(chat, format!("❌ {e}")).await;
                }
            }
            return;
        }

        if text == "/run" || text.starts_with("/run ") {
            let command = text.strip_prefix("/run").map(str::trim).unwrap_or("");
            if command.is_empty() {
                let allowed = self.config.snapshot().security.commands_whitelist.clone();
                let listing = if allowed.is_empty() {
                    "(whitelist is empty)".to_string()
                } else {
                    allowed
                        .iter()
                        .map(|c| format!("• {c}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                let _ = bot
                    .send_message(
                        chat,
                        format!("Usage: /run <command>\n\nPermitted commands:\n{listing}"),
                    )
                    .await;
                return;
            }

            let _ = bot.send_chat_action(chat, ChatAction::Typing).await;
            match self
                .executor
                .execute(command, CommandOrigin::Operator(identity))
                .await
            {
                Ok(result) => {
                    let mut output = result.output().trim().to_string();
                    if output.chars().count() > REPLY_OUTPUT_LIMIT {
                        output = output.chars().take(REPLY_OUTPUT_LIMIT).collect();
                        output.push_str("\n\n… (truncated)");
                    } else if result.truncated {
                        output.push_str("\n\n… (output capped)");
                    }
                    let headline = if result.timed_out {
                        "⏱ Timed out; process killed. Partial output:".to_string()
                    } else if result.success() {
                        "✅ Result:".to_string()
                    } else {
                        format!("⚠️ Exited with code {}:", result.exit_code.unwrap_or(-1))
                    };
                    let body = if output.is_empty() {
                        "(no output)".to_string()
                    } else {
                        output
                    };
                    let _ = bot.send_message(chat, format!("{headline}\n\n{body}")).await;
                }
                Err(e) => {
                    let _ = bot.send_message(chat, format!("⛔ {e}")).await;
                }
            }
            return;
        }

        if text == "/schedule" || text.starts_with("/schedule ") {
            let rest = text.strip_prefix("/schedule").map(str::trim).unwrap_or("");
            let (time, command) = match rest.split_once(' ') {
                Some((time, command)) if !command.trim().is_empty() => (time, command.trim()),
                _ => {
                    let _ = bot
                        .send_message(
                            chat,
                            "Usage: /schedule HH:MM <command>\n\nExample: /schedule 22:00 ./backup.sh",
                        )
                        .await;
                    return;
                }
            };
            match self.scheduler.schedule(identity, time, command).await {
                Ok((task, whitelisted)) => {
                    let mut reply = format!(
                        "✅ Task scheduled\n\nID: {}\n⏰ {} (daily)\n📝 {}",
                        task.id, task.fire_time, task.command
                    );
                    if !whitelisted {
                        reply.push_str(
                            "\n\n⚠️ This command is not currently whitelisted; it will be refused when it fires unless the whitelist changes.",
                        );
                    }
                    let _ = bot.send_message(chat, reply).await;
                }
                Err(e) => {
                    let _ = bot.send_message(chat, format!("❌ {e}")).await;
                }
            }
            return;
        }

        if text == "/tasks" {
            match self.scheduler.list().await {
                Ok(tasks) if tasks.is_empty() => {
                    let _ = bot.send_message(chat, "📋 No scheduled tasks.").await;
                }
                Ok(tasks) => {
                    let mut reply = String::from("📋 Scheduled Tasks\n\n");
                    for task in tasks {
                        reply.push_str(&format!(
                            "✅ ID {} — ⏰ {} ({}, owner {}, created {})\n📝 {}\n\n",
                            task.id,
                            task.fire_time,
                            task.frequency.as_str(),
                            task.owner_id,
                            task.created_at,
                            task.command
                        ));
                    }
                    let _ = bot.send_message(chat, reply).await;
                }
                Err(e) => {
                    let _ = bot.send_message(chat, format!("❌ {e}")).await;
                }
            }
            return;
        }

        if text == "/cancel" || text.starts_with("/cancel ") {
            let rest = text.strip_prefix("/cancel").map(str::trim).unwrap_or("");
            let Ok(task_id) = rest.parse::<i64>() else {
                let _ = bot.send_message(chat, "Usage: /cancel <id>").await;
                return;
            };
            match self.scheduler.cancel(task_id, identity).await {
                Ok(()) => {
                    let _ = bot.send_message(chat, format!("✅ Task {task_id} cancelled.")).await;
                }
                Err(e) => {
                    let _ = bot.send_message(chat, format!("❌ {e}")).await;
                }
            }
            return;
        }

        if text == "/gpio" || text.starts_with("/gpio ") {
            let rest = text.strip_prefix("/gpio").map(str::trim).unwrap_or("");
            let parts: Vec<&str> = rest.split_whitespace().collect();
            let parsed = match parts.as_slice() {
                [pin, level] => pin.parse::<u8>().ok().zip(PinLevel::parse(level)),
                _ => None,
            };
            let Some((pin, level)) = parsed else {
                let _ = bot
                    .send_message(chat, "Usage: /gpio <pin> on|off\n\nExample: /gpio 17 on")
                    .await;
                return;
            };
            match self.gpio.set(pin, level, identity).await {
                Ok(()) => {
                    let _ = bot.send_message(chat, format!("✅ GPIO {pin} set {level}")).await;
                }
                Err(e) => {
                    let _ = bot.send_message(chat, format!("❌ {e}")).await;
                }
            }
            return;
        }

        if text == "/reboot" {
            let _ = bot
                .send_message(chat, "⚠️ Reboot the system? Confirm with /reboot confirm")
                .await;
            return;
        }

        if text == "/reboot confirm" {
            if let Err(e) = self
                .store
                .record_event(
                    EventType::SystemReboot,
                    &format!("system reboot requested by operator {identity}"),
                    None,
                )
                .await
            {
                error!("failed to record reboot event: {}", e);
            }
            match NativePlatform::reboot() {
                Ok(_) => {
                    let _ = bot.send_message(chat, "🔄 Rebooting…").await;
                }
                Err(e) => {
                    let _ = bot.send_message(chat, format!("❌ Reboot failed: {e}")).await;
                }
            }
            return;
        }

        let _ = bot
            .send_message(chat, "Unknown command. Send /help for the command list.")
            .await;
    }
}

#[async_trait]
impl LifecycleComponent for TelegramInterface {
    async fn on_init(&mut self) -> Result<()> {
        info!("Telegram interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        info!("Telegram interface starting...");
        if let Err(e) = self.start_bot().await {
            error!("Telegram bot crashed: {}", e);
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("Telegram interface shutting down...");
        Ok(())
    }
}

/// Fans outbound alerts to every authorized operator. Delivery failures to
/// one operator never block the rest.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    config: ConfigHandle,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn broadcast(&self, text: &str, photo: Option<&Path>) -> Result<()> {
        for user_id in self.config.snapshot().telegram.authorized_users.iter().copied() {
            let chat = ChatId(user_id);
            let sent = match photo {
                Some(path) => self
                    .bot
                    .send_photo(chat, InputFile::file(path.to_path_buf()))
                    .caption(text.to_string())
                    .await
                    .map(|_| ()),
                None => self.bot.send_message(chat, text).await.map(|_| ()),
            };
            match sent {
                Ok(()) => info!("alert delivered to operator {}", user_id),
                Err(e) => error!("failed to alert operator {}: {}", user_id, e),
            }
        }
        Ok(())
    }
}
