//! Command handlers: the behavior behind each routed command.

use anyhow::Result;
use tracing::debug;

use crate::context::BotContext;
use crate::ollama::{ChatMessage, Role};
use crate::router::Command;

const FAILURE_NOTICE: &str = "Something went wrong";

/// Execute a routed command. `display` is the sender's resolved display
/// name; `args` is the argument text after the command token.
pub async fn execute(
    ctx: &mut BotContext,
    cmd: Command,
    room: &str,
    sender: &str,
    display: &str,
    args: &str,
) -> Result<()> {
    match cmd {
        Command::Ai => handle_ai(ctx, room, sender, display, args).await,
        Command::CrossUser => handle_x(ctx, room, display, args).await,
        Command::Persona => handle_persona(ctx, room, sender, display, args).await,
        Command::Custom => handle_custom(ctx, room, sender, display, args).await,
        Command::Reset => handle_reset(ctx, room, sender, display, args).await,
        Command::Stock => handle_reset(ctx, room, sender, display, "stock").await,
        Command::Help => handle_help(ctx, room, display).await,
        Command::Model => handle_model(ctx, room, args).await,
        Command::Clear => handle_clear(ctx, room).await,
        Command::Verbose => handle_verbose(ctx, room, args).await,
        Command::Auth => handle_auth(ctx, room, display, args, true).await,
        Command::Deauth => handle_auth(ctx, room, display, args, false).await,
        Command::GlobalPersona => handle_gpersona(ctx, room, display, args).await,
    }
}

/// Run a completion over `messages`, with tools when any are available.
/// `None` means the backend failed and a failure notice should be sent.
async fn complete(ctx: &BotContext, messages: &mut Vec<ChatMessage>) -> Option<String> {
    let text = ctx.respond_with_tools(messages, "auto").await;
    // An empty final answer (including one produced at the tool-round
    // ceiling) is deliberately conflated with backend failure: the room gets
    // a failure notice either way, never an empty post.
    if text.is_empty() {
        return None;
    }
    Some(text)
}

async fn send_reply(ctx: &BotContext, room: &str, display: &str, text: &str) -> Result<()> {
    let body = format!("**{display}**:\n{text}");
    let html = ctx.render(&body);
    ctx.transport.send_text(room, &body, html.as_deref()).await
}

async fn send_notice(ctx: &BotContext, room: &str, text: &str) -> Result<()> {
    let html = ctx.render(text);
    ctx.transport.send_text(room, text, html.as_deref()).await
}

/// Converse on the transcript owner's behalf: append the user turn, run the
/// completion, store the reply, and post it addressed to `display`.
async fn converse(
    ctx: &mut BotContext,
    room: &str,
    user: &str,
    display: &str,
    message: Option<&str>,
) -> Result<()> {
    if let Some(message) = message {
        ctx.history.add(room, user, Role::User, message);
    }
    let mut messages = ctx.history.get(room, user);
    let Some(raw) = complete(ctx, &mut messages).await else {
        return send_notice(ctx, room, FAILURE_NOTICE).await;
    };
    let (text, thinking) = strip_thinking(&raw);
    for block in thinking {
        debug!("Model thinking: {}", block);
    }
    ctx.history.add(room, user, Role::Assistant, &text);
    send_reply(ctx, room, display, &text).await
}

async fn handle_ai(
    ctx: &mut BotContext,
    room: &str,
    sender: &str,
    display: &str,
    args: &str,
) -> Result<()> {
    let message = (!args.is_empty()).then_some(args);
    converse(ctx, room, sender, display, message).await
}

/// `.x <target> <message>`: talk on another user's transcript. The target is
/// a display name or a full user ID, and must already have history. The
/// reply is headed with the caller's name; the exchange is stored on the
/// target's transcript.
async fn handle_x(ctx: &mut BotContext, room: &str, display: &str, args: &str) -> Result<()> {
    let Some((target, message)) = args.split_once(' ') else {
        return Ok(());
    };
    let message = message.trim();
    if message.is_empty() {
        return Ok(());
    }

    let user = if target.starts_with('@') && target.contains(':') {
        target.to_string()
    } else {
        let mut found = None;
        for candidate in ctx.history.users_in_room(room) {
            if ctx.transport.display_name(&candidate).await == target {
                found = Some(candidate);
                break;
            }
        }
        match found {
            Some(user) => user,
            None => return Ok(()),
        }
    };
    if !ctx.history.has_history(room, &user) {
        return Ok(());
    }

    converse(ctx, room, &user, display, Some(message)).await
}

async fn handle_persona(
    ctx: &mut BotContext,
    room: &str,
    sender: &str,
    display: &str,
    args: &str,
) -> Result<()> {
    // An empty persona falls back to the global personality inside
    // init_prompt; the self-intro still runs.
    let persona = args.trim();
    ctx.history.init_prompt(room, sender, Some(persona), None);
    converse(ctx, room, sender, display, Some("introduce yourself")).await
}

async fn handle_custom(
    ctx: &mut BotContext,
    room: &str,
    sender: &str,
    display: &str,
    args: &str,
) -> Result<()> {
    let prompt = args.trim();
    if prompt.is_empty() {
        return Ok(());
    }
    ctx.history.init_prompt(room, sender, None, Some(prompt));
    converse(ctx, room, sender, display, Some("introduce yourself")).await
}

async fn handle_reset(
    ctx: &mut BotContext,
    room: &str,
    sender: &str,
    display: &str,
    args: &str,
) -> Result<()> {
    let stock = args.trim().eq_ignore_ascii_case("stock");
    ctx.history.reset(room, sender, stock);
    let text = if stock {
        format!("Stock settings applied for {display}")
    } else {
        format!("{} reset to default for {display}", ctx.bot_name)
    };
    send_notice(ctx, room, &text).await
}

async fn handle_help(ctx: &BotContext, room: &str, display: &str) -> Result<()> {
    let help = include_str!("../help.md");
    let mut parts = help.splitn(2, "~~~");
    let public = parts.next().unwrap_or_default().trim();
    send_notice(ctx, room, public).await?;
    if ctx.admins.iter().any(|a| a == display) {
        if let Some(admin) = parts.next() {
            send_notice(ctx, room, admin.trim()).await?;
        }
    }
    Ok(())
}

/// `.model`: show the active model and catalog; `.model reset` returns to
/// the default; `.model <name>` switches, resolving catalog keys and passing
/// unknown names through literally.
async fn handle_model(ctx: &mut BotContext, room: &str, args: &str) -> Result<()> {
    ctx.reload_models();
    let arg = args.trim();
    if arg.is_empty() {
        let catalog = ctx.models.keys().cloned().collect::<Vec<_>>().join(", ");
        let text = format!(
            "**Current model**: {}\n**Available models**: {}",
            ctx.model, catalog
        );
        return send_notice(ctx, room, &text).await;
    }
    ctx.model = if arg == "reset" {
        ctx.default_model.clone()
    } else {
        ctx.models.get(arg).cloned().unwrap_or_else(|| arg.to_string())
    };
    let text = format!("Model set to **{}**", ctx.model);
    send_notice(ctx, room, &text).await
}

async fn handle_clear(ctx: &mut BotContext, room: &str) -> Result<()> {
    ctx.history.clear_all();
    ctx.model = ctx.default_model.clone();
    let personality = ctx.default_personality.clone();
    ctx.history.set_personality(&personality);
    send_notice(ctx, room, "Bot has been reset for everyone").await
}

async fn handle_verbose(ctx: &mut BotContext, room: &str, args: &str) -> Result<()> {
    let arg = args.trim().to_lowercase();
    let new_state = match arg.as_str() {
        "" | "status" => {
            let text = format!(
                "Verbose mode is **{}**",
                if ctx.verbose { "ON" } else { "OFF" }
            );
            return send_notice(ctx, room, &text).await;
        }
        "on" | "true" | "1" | "enable" | "enabled" => true,
        "off" | "false" | "0" | "disable" | "disabled" => false,
        "toggle" | "switch" => !ctx.verbose,
        _ => {
            return send_notice(ctx, room, "Usage: .verbose [on|off|toggle]").await;
        }
    };
    ctx.verbose = new_state;
    ctx.history.set_verbose(new_state);
    let text = format!(
        "Verbose mode set to **{}**",
        if new_state { "ON" } else { "OFF" }
    );
    send_notice(ctx, room, &text).await
}

/// `.auth <nick>` / `.deauth <nick>`: owner-only admin list edits. Non-owner
/// invocations are silently ignored.
async fn handle_auth(
    ctx: &mut BotContext,
    room: &str,
    display: &str,
    args: &str,
    grant: bool,
) -> Result<()> {
    if !ctx.is_owner(display) {
        return Ok(());
    }
    let nick = args.trim();
    if nick.is_empty() {
        return Ok(());
    }
    let text = if grant {
        if !ctx.admins.iter().any(|a| a == nick) {
            ctx.admins.push(nick.to_string());
        }
        format!("{nick} added to admins")
    } else {
        ctx.admins.retain(|a| a != nick);
        format!("{nick} removed from admins")
    };
    send_notice(ctx, room, &text).await
}

async fn handle_gpersona(
    ctx: &mut BotContext,
    room: &str,
    display: &str,
    args: &str,
) -> Result<()> {
    if !ctx.is_owner(display) {
        return Ok(());
    }
    let arg = args.trim();
    if arg.is_empty() {
        return Ok(());
    }
    let personality = if arg == "reset" {
        ctx.default_personality.clone()
    } else {
        arg.to_string()
    };
    ctx.history.set_personality(&personality);
    let text = format!("Global personality set to {personality}");
    send_notice(ctx, room, &text).await
}

/// Strip reasoning blocks some models prepend to their answers.
///
/// Handles `<think>...</think>` and the
/// `<|begin_of_thought|>`/`<|begin_of_solution|>` pair; returns the visible
/// text and the removed blocks for debug logging.
pub fn strip_thinking(text: &str) -> (String, Vec<String>) {
    let mut thinking = Vec::new();
    let mut visible = text.to_string();

    if let Some(rest) = visible.strip_prefix("<think>") {
        if let Some((thought, after)) = rest.split_once("</think>") {
            thinking.push(thought.trim().to_string());
            visible = after.to_string();
        }
    }
    if let Some((before, rest)) = visible.split_once("<|begin_of_thought|>") {
        if let Some((thought, after)) = rest.split_once("<|end_of_thought|>") {
            thinking.push(thought.trim().to_string());
            visible = format!("{before}{after}");
        }
    }
    if let Some((_, rest)) = visible.split_once("<|begin_of_solution|>") {
        let solution = match rest.split_once("<|end_of_solution|>") {
            Some((solution, _)) => solution,
            None => rest,
        };
        visible = solution.to_string();
    }

    (visible.trim().to_string(), thinking)
}
