//! Discord wiring: the poise framework, the message event handler that
//! feeds the [`CommandRouter`], and scheduler startup once the gateway is
//! ready.

use crate::bans::PersistentBanStore;
use crate::config::Config;
use crate::rcon::RconSession;
use crate::registry::ServerRegistry;
use crate::router::{CommandInvocation, CommandRouter};
use crate::scheduler::{ChannelSink, Scheduler};
use poise::serenity_prelude as serenity;
use std::future::Future;
use std::sync::Arc;

/// Bot application data shared across event handler invocations.
pub struct Data {
    router: Arc<CommandRouter<RconSession>>,
    command_prefix: String,
    admin_role_id: u64,
}

type Error = Box<dyn std::error::Error + Send + Sync>;

/// Posts scheduler output to Discord channels.
struct DiscordSink {
    http: Arc<serenity::Http>,
}

impl ChannelSink for DiscordSink {
    fn emit(&self, channel_id: u64, text: String) -> impl Future<Output = ()> + Send {
        let http = self.http.clone();
        async move {
            if let Err(e) = serenity::ChannelId::new(channel_id).say(&http, text).await {
                log::warn!("failed to post to channel {}: {}", channel_id, e);
            }
        }
    }
}

pub async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;

    let registry = Arc::new(ServerRegistry::from_config(&config));
    let bans = Arc::new(PersistentBanStore::open(config.ban_store_path.as_str()).await?);
    let router = Arc::new(CommandRouter::new(
        registry.clone(),
        bans.clone(),
        config.policy,
    ));

    let data = Data {
        router,
        command_prefix: config.command_prefix.clone(),
        admin_role_id: config.policy.admin_role_id,
    };

    // Reading the command prefix from messages needs the privileged
    // message-content intent.
    let intents = serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            event_handler: |context, event, framework, data| {
                Box::pin(handle_event(context, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |context, ready, _framework| {
            Box::pin(async move {
                log::info!("connected to Discord as {}", ready.user.name);

                // First dial per session, so auth/config problems show up
                // in the log at startup rather than on first command.
                for (server, session) in registry.iter() {
                    let game = server.game;
                    let session = session.clone();
                    tokio::spawn(async move {
                        if let Err(e) = session.connect().await {
                            log::warn!("[{}] initial connection failed: {}", game.key(), e);
                        }
                    });
                }

                let sink = Arc::new(DiscordSink {
                    http: context.http.clone(),
                });
                let handles = Scheduler::new(registry, bans, sink).start();
                log::info!("started {} background task(s)", handles.len());

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(config.discord_token.clone(), intents)
        .framework(framework)
        .await?;

    client.start().await?;

    Ok(())
}

async fn handle_event(
    context: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        handle_message(context, new_message, data).await?;
    }
    Ok(())
}

/// Translate one Discord message into a [`CommandInvocation`] and reply
/// with whatever the router produces. Router errors never reach here;
/// everything user-facing is rendered into the reply text.
async fn handle_message(
    context: &serenity::Context,
    message: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if message.author.bot {
        return Ok(());
    }
    let Some(content) = message.content.strip_prefix(&data.command_prefix) else {
        return Ok(());
    };

    let has_admin_role = message
        .member
        .as_deref()
        .map(|member| {
            member
                .roles
                .iter()
                .any(|role| role.get() == data.admin_role_id)
        })
        .unwrap_or(false);

    let invocation = CommandInvocation {
        user_id: message.author.id.get(),
        user_name: message.author.name.clone(),
        channel_id: message.channel_id.get(),
        has_admin_role,
        content: content.to_string(),
    };

    if let Some(reply) = data.router.handle(&invocation).await {
        message.channel_id.say(&context.http, reply).await?;
    }
    Ok(())
}
