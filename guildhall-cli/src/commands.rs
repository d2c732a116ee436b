//! Slash commands typed into the console

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use guildhall_core::config::SessionConfig;
use guildhall_core::core_guild::errors::{FailureKind, GuildError, UserFacing};
use guildhall_core::core_guild::{GuildId, GuildServices, PlayerId, RelationType};
use guildhall_core::core_screens::actions::describe_relation;
use guildhall_core::core_screens::{
    perform, set_relation, ActionError, ApplicationsScreen, ConfirmScreen, DirectoryScreen,
    InvitationsScreen, MembersScreen, RelationsScreen, SettingsScreen,
};
use guildhall_core::core_session::{
    ActionTarget, Click, ClickKind, ConfirmError, Screen, SessionHandle,
};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "console", no_binary_name = true)]
struct SlashLine {
    #[command(subcommand)]
    command: Slash,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Slash {
    /// Guild management
    Guild {
        #[command(subcommand)]
        action: GuildAction,
    },

    /// Click a slot of the open screen
    Click {
        slot: usize,

        /// primary, secondary or tertiary
        #[arg(default_value = "primary")]
        kind: String,
    },

    /// Close the open screen
    Close,

    /// Disconnect a player and end their session
    Quit { player: String },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum GuildAction {
    /// Found a new guild
    Create { name: String, tag: Option<String> },
    /// Browse all guilds
    List,
    Members,
    Relations,
    Applications,
    Invites,
    Settings,
    Invite { player: String },
    /// Ask to join a guild
    Apply {
        guild: String,
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },
    Promote { player: String },
    Demote { player: String },
    Kick { player: String },
    /// Hand leadership to another member
    Transfer { player: String },
    Leave,
    /// Arm, confirm or cancel disbanding your guild
    Disband {
        #[arg(value_enum)]
        step: Option<DisbandStep>,
    },
    Ally { guild: String },
    Enemy { guild: String },
    War { guild: String },
    Truce { guild: String },
    Neutral { guild: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DisbandStep {
    Confirm,
    Cancel,
}

/// Split on whitespace; double quotes group words
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}

/// Parse a line starting with `/`
pub fn parse(line: &str) -> Result<Slash, clap::Error> {
    let tokens = tokenize(line.trim().trim_start_matches('/'));
    SlashLine::try_parse_from(tokens).map(|l| l.command)
}

/// Routes `<player> <text>` lines to commands or to chat input
pub struct Console {
    services: Arc<GuildServices>,
    handle: SessionHandle,
    sessions: SessionConfig,
}

impl Console {
    pub fn new(services: Arc<GuildServices>, handle: SessionHandle) -> Self {
        let sessions = services.config.sessions.clone();
        Self {
            services,
            handle,
            sessions,
        }
    }

    /// Handle one console line. Errors mean the session loop is gone.
    pub async fn handle_line(&self, line: &str) -> Result<()> {
        let line = line.trim();
        let Some((player, text)) = line.split_once(char::is_whitespace) else {
            if !line.is_empty() {
                println!("usage: <player> <text>");
            }
            return Ok(());
        };
        let player = PlayerId::new(player);
        let text = text.trim();

        if text.starts_with('/') {
            return match parse(text) {
                Ok(command) => self.execute(&player, command).await,
                Err(e) => {
                    let rendered = e.to_string();
                    self.handle.notify(&player, rendered.trim_end()).await?;
                    Ok(())
                }
            };
        }

        let dispatch = self.handle.input(&player, text).await?;
        if !dispatch.consumed() {
            println!("<{}> {}", player, text);
        }
        Ok(())
    }

    async fn execute(&self, player: &PlayerId, command: Slash) -> Result<()> {
        match command {
            Slash::Guild { action } => self.guild(player, action).await,
            Slash::Click { slot, kind } => {
                match ClickKind::parse(&kind) {
                    Some(kind) => self.handle.click(player, Click { slot, kind }).await?,
                    None => {
                        self.handle
                            .notify(player, format!("Unknown click kind '{}'.", kind))
                            .await?
                    }
                }
                Ok(())
            }
            Slash::Close => Ok(self.handle.close(player).await?),
            Slash::Quit { player } => Ok(self.handle.disconnect(&PlayerId::new(player)).await?),
        }
    }

    async fn guild(&self, player: &PlayerId, action: GuildAction) -> Result<()> {
        let services = &self.services;
        let sessions = &self.sessions;

        let outcome: Result<String, ActionError> = match action {
            GuildAction::List => return self.open(player, DirectoryScreen::new(sessions)).await,
            GuildAction::Members => return self.open(player, MembersScreen::new(sessions)).await,
            GuildAction::Relations => return self.open(player, RelationsScreen::new(sessions)).await,
            GuildAction::Applications => {
                return self.open(player, ApplicationsScreen::new(sessions)).await
            }
            GuildAction::Invites => return self.open(player, InvitationsScreen::new(sessions)).await,
            GuildAction::Settings => return self.open(player, SettingsScreen::new(sessions)).await,
            GuildAction::Kick { player: target } => {
                let target = ActionTarget::KickMember(PlayerId::new(target));
                return self.open(player, ConfirmScreen::new(target)).await;
            }
            GuildAction::Leave => match self.own_guild(player).await {
                Ok(guild) => {
                    let target = ActionTarget::LeaveGuild(guild);
                    return self.open(player, ConfirmScreen::new(target)).await;
                }
                Err(e) => Err(e),
            },
            GuildAction::Disband { step } => self.disband(player, step).await?,

            GuildAction::Create { name, tag } => services
                .guilds
                .create_guild(player, &name, tag.as_deref())
                .await
                .map(|g| format!("Guild {} created.", g.display_name()))
                .map_err(ActionError::from),
            GuildAction::Invite { player: target } => services
                .recruitment
                .invite(player, &PlayerId::new(target))
                .await
                .map(|i| format!("Invited {}.", i.target))
                .map_err(ActionError::from),
            GuildAction::Apply { guild, message } => {
                self.apply(player, &guild, &message.join(" ")).await
            }
            GuildAction::Promote { player: target } => services
                .membership
                .promote(player, &PlayerId::new(target))
                .await
                .map(|m| format!("{} is now {}.", m.player, m.role.as_str().to_lowercase()))
                .map_err(ActionError::from),
            GuildAction::Demote { player: target } => services
                .membership
                .demote(player, &PlayerId::new(target))
                .await
                .map(|m| format!("{} is now {}.", m.player, m.role.as_str().to_lowercase()))
                .map_err(ActionError::from),
            GuildAction::Transfer { player: target } => services
                .membership
                .hand_over(player, &PlayerId::new(target))
                .await
                .map(|m| format!("{} now leads the guild.", m.player))
                .map_err(ActionError::from),

            GuildAction::Ally { guild } => self.relation(player, &guild, RelationType::Ally).await,
            GuildAction::Enemy { guild } => self.relation(player, &guild, RelationType::Enemy).await,
            GuildAction::War { guild } => self.relation(player, &guild, RelationType::War).await,
            GuildAction::Truce { guild } => self.relation(player, &guild, RelationType::Truce).await,
            GuildAction::Neutral { guild } => {
                self.relation(player, &guild, RelationType::Neutral).await
            }
        };

        self.report(player, outcome).await
    }

    async fn open<S: Screen>(&self, player: &PlayerId, screen: S) -> Result<()> {
        Ok(self.handle.open(player, screen).await?)
    }

    async fn own_guild(&self, player: &PlayerId) -> Result<GuildId, ActionError> {
        let guild = self
            .services
            .guilds
            .guild_of(player)
            .await?
            .ok_or(GuildError::NotInGuild)?;
        Ok(guild.id)
    }

    async fn apply(
        &self,
        player: &PlayerId,
        guild: &str,
        message: &str,
    ) -> Result<String, ActionError> {
        let target = self.services.guilds.find(guild).await?;
        self.services
            .recruitment
            .apply(player, &target.id, message)
            .await?;
        Ok(format!("Applied to {}.", target.name))
    }

    async fn relation(
        &self,
        player: &PlayerId,
        guild: &str,
        relation_type: RelationType,
    ) -> Result<String, ActionError> {
        let relation = set_relation(&self.services, player, guild, relation_type).await?;
        Ok(describe_relation(&relation, guild))
    }

    /// Text path for the disband confirmation: arm, then confirm or cancel
    async fn disband(
        &self,
        player: &PlayerId,
        step: Option<DisbandStep>,
    ) -> Result<Result<String, ActionError>> {
        let guild = match self.own_guild(player).await {
            Ok(guild) => guild,
            Err(e) => return Ok(Err(e)),
        };
        let target = ActionTarget::DisbandGuild(guild);

        match step {
            None => {
                let armed = self.handle.arm(player, target).await?;
                if let Some(previous) = armed.previous {
                    self.handle
                        .notify(player, format!("Your request to {} was replaced.", previous))
                        .await?;
                }
                Ok(Ok(format!(
                    "Type /guild disband confirm within {} seconds to disband your guild.",
                    self.sessions.confirmation_timeout.as_secs()
                )))
            }
            Some(DisbandStep::Confirm) => match self.handle.confirm(player, target).await? {
                Ok(target) => Ok(perform(&self.services, player, &target).await),
                Err(e) => Ok(Err(e.into())),
            },
            Some(DisbandStep::Cancel) => match self.handle.cancel(player).await? {
                Some(_) => Ok(Ok("Cancelled.".to_string())),
                None => Ok(Err(ConfirmError::NoPendingAction.into())),
            },
        }
    }

    async fn report(&self, player: &PlayerId, outcome: Result<String, ActionError>) -> Result<()> {
        let text = match outcome {
            Ok(text) => text,
            Err(e) => {
                if e.failure_kind() == FailureKind::Facade {
                    warn!(player = %player, error = %e, "Command failed in data layer");
                } else {
                    debug!(player = %player, error = %e, "Command rejected");
                }
                e.user_message()
            }
        };
        self.handle.notify(player, text).await?;
        Ok(())
    }
}
