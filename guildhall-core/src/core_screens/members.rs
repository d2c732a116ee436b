//! Guild roster with role management

use super::actions::ActionError;
use super::confirm::ConfirmScreen;
use super::{list_size, mutate, page_of, per_page, render_list, render_status, Loadable};
use crate::config::SessionConfig;
use crate::core_guild::guild::{Guild, GuildRole, Member};
use crate::core_guild::services::GuildServices;
use crate::core_guild::types::PlayerId;
use crate::core_session::{
    ActionTarget, Cell, CellPayload, Click, ClickKind, Grid, Pager, Screen, ScreenContext,
    ScreenError,
};

#[derive(Debug, Clone)]
pub struct Roster {
    pub guild: Guild,
    pub viewer: Member,
    pub members: Vec<Member>,
}

async fn load_roster(services: &GuildServices, player: &PlayerId) -> Result<Roster, ActionError> {
    let viewer = services.membership.member(player).await?;
    let guild = services.guilds.guild(&viewer.guild_id).await?;
    let members = services.membership.roster(&guild.id).await?;
    Ok(Roster {
        guild,
        viewer,
        members,
    })
}

/// Left click promotes, right click demotes, middle click kicks
pub struct MembersScreen {
    size: usize,
    pager: Pager,
    roster: Loadable<Roster>,
}

impl MembersScreen {
    pub fn new(config: &SessionConfig) -> Self {
        let size = list_size(config);
        Self {
            size,
            pager: Pager::new(per_page(size)),
            roster: Loadable::NotLoaded,
        }
    }

    fn member_cell(member: &Member, viewer: &Member) -> Cell {
        let icon = match member.role {
            GuildRole::Leader => "GOLDEN_HELMET",
            GuildRole::Officer => "IRON_HELMET",
            GuildRole::Member => "LEATHER_HELMET",
        };
        let mut cell = Cell::new(icon, member.player.to_string())
            .lore(format!("Role: {}", member.role.as_str()))
            .payload(CellPayload::Member(member.player.clone()));
        if viewer.role == GuildRole::Leader && member.player != viewer.player {
            cell = cell
                .lore("Left click: promote")
                .lore("Right click: demote");
        }
        if viewer.role >= GuildRole::Officer && member.role < viewer.role {
            cell = cell.lore("Middle click: kick");
        }
        cell
    }
}

impl Screen for MembersScreen {
    fn title(&self) -> String {
        match self.roster.ready() {
            Some(roster) => format!("{} members", roster.guild.name),
            None => "Guild members".to_string(),
        }
    }

    fn build(&mut self, grid: &mut Grid, cx: &mut ScreenContext<'_>) -> Result<(), ScreenError> {
        if self.roster.begin() {
            let services = cx.services().clone();
            let player = cx.player().clone();
            cx.load(
                async move { load_roster(&services, &player).await },
                |screen: &mut MembersScreen, result, _cx: &mut ScreenContext<'_>| {
                    screen.roster.settle(result)
                },
            );
        }

        let Some(roster) = self.roster.ready() else {
            grid.fill_border();
            return render_status(grid, &self.roster);
        };
        let cells = page_of(&roster.members, &self.pager)
            .iter()
            .map(|m| Self::member_cell(m, &roster.viewer))
            .collect();
        render_list(grid, &self.pager, cells, roster.members.len(), "No members")
    }

    fn size(&self) -> usize {
        self.size
    }

    fn on_interact(
        &mut self,
        click: Click,
        payload: Option<&CellPayload>,
        cx: &mut ScreenContext<'_>,
    ) {
        if self.pager.turn(payload) {
            cx.refresh();
            return;
        }
        let Some(CellPayload::Member(target)) = payload else {
            return;
        };

        let services = cx.services().clone();
        let actor = cx.player().clone();
        let target = target.clone();
        match click.kind {
            ClickKind::Primary => mutate(
                cx,
                async move { services.membership.promote(&actor, &target).await },
                |m: Member| format!("{} is now {}.", m.player, m.role.as_str().to_lowercase()),
            ),
            ClickKind::Secondary => mutate(
                cx,
                async move { services.membership.demote(&actor, &target).await },
                |m: Member| format!("{} is now {}.", m.player, m.role.as_str().to_lowercase()),
            ),
            ClickKind::Tertiary => {
                let config = cx.config().clone();
                cx.open(
                    ConfirmScreen::new(ActionTarget::KickMember(target))
                        .return_to(move || Box::new(MembersScreen::new(&config)) as Box<dyn Screen>),
                );
            }
        }
    }

    fn refresh(&mut self, _cx: &mut ScreenContext<'_>) {
        self.roster.invalidate();
    }
}
