//! Guild overview and settings hub

use super::actions::ActionError;
use super::confirm::ConfirmScreen;
use super::{render_status, ApplicationsScreen, Loadable, MembersScreen, RelationsScreen};
use crate::config::SessionConfig;
use crate::core_guild::errors::{GuildError, UserFacing};
use crate::core_guild::guild::{Guild, GuildRole, Member};
use crate::core_guild::services::GuildServices;
use crate::core_guild::types::PlayerId;
use crate::core_session::{
    ActionTarget, Cell, CellPayload, Click, Grid, InputPrompt, InputVerdict, RejectPolicy,
    Screen, ScreenContext, ScreenError,
};

const INFO_SLOT: usize = 4;
const MEMBERS_SLOT: usize = 10;
const RELATIONS_SLOT: usize = 11;
const APPLICATIONS_SLOT: usize = 12;
const DESCRIPTION_SLOT: usize = 14;
const TAG_SLOT: usize = 15;
const DEPART_SLOT: usize = 16;

#[derive(Debug, Clone)]
pub struct Overview {
    pub guild: Guild,
    pub viewer: Member,
    pub member_count: usize,
}

async fn load_overview(services: &GuildServices, player: &PlayerId) -> Result<Overview, ActionError> {
    let guild = services
        .guilds
        .guild_of(player)
        .await?
        .ok_or(GuildError::NotInGuild)?;
    let viewer = services.membership.member(player).await?;
    let member_count = services.store.count_members(&guild.id).await?;
    Ok(Overview {
        guild,
        viewer,
        member_count,
    })
}

fn reopen(config: &SessionConfig) -> impl Fn() -> Box<dyn Screen> + Send + 'static {
    let config = config.clone();
    move || Box::new(SettingsScreen::new(&config)) as Box<dyn Screen>
}

/// Entry screen for a guild member
pub struct SettingsScreen {
    config: SessionConfig,
    overview: Loadable<Overview>,
}

impl SettingsScreen {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            config: config.clone(),
            overview: Loadable::NotLoaded,
        }
    }

    pub fn overview(&self) -> Option<&Overview> {
        self.overview.ready()
    }

    fn info_cell(overview: &Overview) -> Cell {
        let guild = &overview.guild;
        let mut cell = Cell::new(
            guild.banner.clone().unwrap_or_else(|| "WHITE_BANNER".to_string()),
            guild.display_name(),
        )
        .lore(format!("Leader: {}", guild.leader))
        .lore(format!("Members: {}/{}", overview.member_count, guild.capacity))
        .lore(format!("Level {}", guild.level));
        if let Some(description) = &guild.description {
            cell = cell.lore(description.clone());
        }
        if guild.frozen {
            cell = cell.lore("Frozen");
        }
        cell.lore(format!("Your role: {}", overview.viewer.role.as_str()))
    }

    fn edit_description(&self, cx: &mut ScreenContext<'_>) {
        let max = cx.services().guilds.rules().description_max_len;
        let prompt = InputPrompt::new(
            format!("Type the new description (up to {} characters).", max),
            |text: &str, cx: &mut ScreenContext<'_>| {
                let text = match cx.services().guilds.validate_description(text) {
                    Ok(text) => text,
                    Err(e) => return InputVerdict::Reject(e.user_message()),
                };
                let services = cx.services().clone();
                let player = cx.player().clone();
                let config = cx.config().clone();
                cx.spawn(
                    async move { services.guilds.set_description(&player, &text).await },
                    move |result, cx: &mut ScreenContext<'_>| {
                        match result {
                            Ok(_) => cx.notify("Description updated."),
                            Err(e) => cx.report(&e),
                        }
                        cx.open(SettingsScreen::new(&config));
                    },
                );
                InputVerdict::Accept
            },
        )
        .origin(reopen(&self.config))
        .on_reject(RejectPolicy::KeepCapturing);
        cx.enter_input(prompt);
    }

    fn edit_tag(&self, cx: &mut ScreenContext<'_>) {
        let prompt = InputPrompt::new(
            "Type the new guild tag.",
            |text: &str, cx: &mut ScreenContext<'_>| {
                let tag = match cx.services().guilds.validate_tag(text) {
                    Ok(tag) => tag,
                    Err(e) => return InputVerdict::Reject(e.user_message()),
                };
                let services = cx.services().clone();
                let player = cx.player().clone();
                let config = cx.config().clone();
                cx.spawn(
                    async move { services.guilds.set_tag(&player, &tag).await },
                    move |result, cx: &mut ScreenContext<'_>| {
                        match result {
                            Ok(guild) => cx.notify(format!("Tag set to [{}].", guild.tag.unwrap_or_default())),
                            Err(e) => cx.report(&e),
                        }
                        cx.open(SettingsScreen::new(&config));
                    },
                );
                InputVerdict::Accept
            },
        )
        .origin(reopen(&self.config))
        .on_reject(RejectPolicy::ReturnToOrigin);
        cx.enter_input(prompt);
    }
}

impl Screen for SettingsScreen {
    fn title(&self) -> String {
        match self.overview.ready() {
            Some(overview) => overview.guild.name.clone(),
            None => "Your guild".to_string(),
        }
    }

    fn build(&mut self, grid: &mut Grid, cx: &mut ScreenContext<'_>) -> Result<(), ScreenError> {
        if self.overview.begin() {
            let services = cx.services().clone();
            let player = cx.player().clone();
            cx.load(
                async move { load_overview(&services, &player).await },
                |screen: &mut SettingsScreen, result, _cx: &mut ScreenContext<'_>| {
                    screen.overview.settle(result)
                },
            );
        }

        grid.fill_border();
        let Some(overview) = self.overview.ready() else {
            return render_status(grid, &self.overview);
        };
        let role = overview.viewer.role;

        grid.set(INFO_SLOT, Self::info_cell(overview))?;
        grid.set(
            MEMBERS_SLOT,
            Cell::new("PLAYER_HEAD", "Members").payload(CellPayload::Action("members")),
        )?;
        grid.set(
            RELATIONS_SLOT,
            Cell::new("SHIELD", "Relations").payload(CellPayload::Action("relations")),
        )?;
        if role >= GuildRole::Officer {
            grid.set(
                APPLICATIONS_SLOT,
                Cell::new("WRITABLE_BOOK", "Applications").payload(CellPayload::Action("applications")),
            )?;
            grid.set(
                DESCRIPTION_SLOT,
                Cell::new("OAK_SIGN", "Edit description").payload(CellPayload::Action("description")),
            )?;
            grid.set(
                TAG_SLOT,
                Cell::new("NAME_TAG", "Edit tag").payload(CellPayload::Action("tag")),
            )?;
        }
        let depart = if role == GuildRole::Leader {
            Cell::new("TNT", "Disband guild").payload(CellPayload::Action("disband"))
        } else {
            Cell::new("OAK_DOOR", "Leave guild").payload(CellPayload::Action("leave"))
        };
        grid.set(DEPART_SLOT, depart)
    }

    fn on_interact(
        &mut self,
        _click: Click,
        payload: Option<&CellPayload>,
        cx: &mut ScreenContext<'_>,
    ) {
        let Some(CellPayload::Action(action)) = payload else {
            return;
        };
        let Some(guild_id) = self.overview.ready().map(|o| o.guild.id.clone()) else {
            return;
        };

        match *action {
            "members" => cx.open(MembersScreen::new(&self.config)),
            "relations" => cx.open(RelationsScreen::new(&self.config)),
            "applications" => cx.open(ApplicationsScreen::new(&self.config)),
            "description" => self.edit_description(cx),
            "tag" => self.edit_tag(cx),
            "disband" => {
                cx.open(ConfirmScreen::new(ActionTarget::DisbandGuild(guild_id)).return_to(reopen(&self.config)))
            }
            "leave" => {
                cx.open(ConfirmScreen::new(ActionTarget::LeaveGuild(guild_id)).return_to(reopen(&self.config)))
            }
            _ => {}
        }
    }

    fn refresh(&mut self, _cx: &mut ScreenContext<'_>) {
        self.overview.invalidate();
    }
}

