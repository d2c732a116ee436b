//! Invitations addressed to the viewer

use super::{list_size, mutate, page_of, per_page, render_list, render_status, Loadable};
use crate::config::SessionConfig;
use crate::core_guild::errors::RecruitmentError;
use crate::core_guild::guild::Member;
use crate::core_guild::recruit::{Invitation, InvitationStatus};
use crate::core_guild::services::GuildServices;
use crate::core_guild::types::PlayerId;
use crate::core_session::{
    Cell, CellPayload, Click, ClickKind, Grid, Pager, Screen, ScreenContext, ScreenError,
};
use futures::future::join_all;

#[derive(Debug, Clone)]
pub struct InvitationRow {
    pub invitation: Invitation,
    pub guild_name: String,
}

async fn load_rows(
    services: &GuildServices,
    player: &PlayerId,
) -> Result<Vec<InvitationRow>, RecruitmentError> {
    let pending: Vec<Invitation> = services
        .recruitment
        .invitations_for(player)
        .await?
        .into_iter()
        .filter(|i| i.status == InvitationStatus::Pending)
        .collect();
    let guilds = join_all(pending.iter().map(|i| services.guilds.guild(&i.guild_id))).await;

    Ok(pending
        .into_iter()
        .zip(guilds)
        .map(|(invitation, guild)| InvitationRow {
            guild_name: guild
                .map(|g| g.display_name())
                .unwrap_or_else(|_| invitation.guild_id.to_string()),
            invitation,
        })
        .collect())
}

/// Left click accepts, right click declines
pub struct InvitationsScreen {
    size: usize,
    pager: Pager,
    rows: Loadable<Vec<InvitationRow>>,
}

impl InvitationsScreen {
    pub fn new(config: &SessionConfig) -> Self {
        let size = list_size(config);
        Self {
            size,
            pager: Pager::new(per_page(size)),
            rows: Loadable::NotLoaded,
        }
    }

    fn invitation_cell(row: &InvitationRow) -> Cell {
        Cell::new("PAPER", row.guild_name.clone())
            .lore(format!("From {}", row.invitation.inviter))
            .lore("Left click: accept")
            .lore("Right click: decline")
            .payload(CellPayload::Invitation(row.invitation.id.clone()))
    }
}

impl Screen for InvitationsScreen {
    fn title(&self) -> String {
        "Invitations".to_string()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn build(&mut self, grid: &mut Grid, cx: &mut ScreenContext<'_>) -> Result<(), ScreenError> {
        if self.rows.begin() {
            let services = cx.services().clone();
            let player = cx.player().clone();
            cx.load(
                async move { load_rows(&services, &player).await },
                |screen: &mut InvitationsScreen, result, _cx: &mut ScreenContext<'_>| {
                    screen.rows.settle(result)
                },
            );
        }

        let Some(rows) = self.rows.ready() else {
            grid.fill_border();
            return render_status(grid, &self.rows);
        };
        let cells = page_of(rows, &self.pager)
            .iter()
            .map(Self::invitation_cell)
            .collect();
        render_list(grid, &self.pager, cells, rows.len(), "No invitations")
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
        let Some(CellPayload::Invitation(id)) = payload else {
            return;
        };

        let services = cx.services().clone();
        let player = cx.player().clone();
        let id = id.clone();
        match click.kind {
            ClickKind::Primary => mutate(
                cx,
                async move { services.recruitment.accept_invitation(&player, &id).await },
                |_: Member| "Welcome to your new guild!".to_string(),
            ),
            ClickKind::Secondary => mutate(
                cx,
                async move { services.recruitment.decline_invitation(&player, &id).await },
                |_: Invitation| "Invitation declined.".to_string(),
            ),
            ClickKind::Tertiary => {}
        }
    }

    fn refresh(&mut self, _cx: &mut ScreenContext<'_>) {
        self.rows.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_session::SessionHandle;
    use crate::test_utils::{next_message, next_screen_with, seeded_services, slot_of, Seeded};

    #[tokio::test]
    async fn test_accept_invitation_from_screen() {
        let Seeded {
            services, beta, ..
        } = seeded_services().await;
        let drifter = PlayerId::new("drifter");
        services.recruitment.invite(&beta.officer, &drifter).await.unwrap();

        let config = SessionConfig::default();
        let (handle, _task) = SessionHandle::new(services.clone(), config.clone());
        handle.open(&drifter, InvitationsScreen::new(&config)).await.unwrap();
        let view = next_screen_with(&handle, "Beta").await.unwrap();
        let slot = slot_of(&view, "Beta").unwrap();

        handle.click(&drifter, Click::primary(slot)).await.unwrap();
        assert_eq!(
            next_message(&handle).await.unwrap(),
            "Welcome to your new guild!"
        );
        let member = services.membership.member(&drifter).await.unwrap();
        assert_eq!(member.guild_id, beta.guild.id);
    }
}
