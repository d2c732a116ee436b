//! Pending join applications, reviewed by officers

use super::actions::ActionError;
use super::{list_size, mutate, page_of, per_page, render_list, render_status, Loadable};
use crate::config::SessionConfig;
use crate::core_guild::guild::{GuildRole, Member};
use crate::core_guild::recruit::Application;
use crate::core_session::{
    Cell, CellPayload, Click, ClickKind, Grid, Pager, Screen, ScreenContext, ScreenError,
};

/// Left click approves, right click rejects
pub struct ApplicationsScreen {
    size: usize,
    pager: Pager,
    applications: Loadable<Vec<Application>>,
}

impl ApplicationsScreen {
    pub fn new(config: &SessionConfig) -> Self {
        let size = list_size(config);
        Self {
            size,
            pager: Pager::new(per_page(size)),
            applications: Loadable::NotLoaded,
        }
    }

    fn application_cell(application: &Application) -> Cell {
        let mut cell = Cell::new("WRITABLE_BOOK", application.applicant.to_string());
        if !application.message.is_empty() {
            cell = cell.lore(format!("\"{}\"", application.message));
        }
        cell.lore("Left click: approve")
            .lore("Right click: reject")
            .payload(CellPayload::Application(application.id.clone()))
    }
}

impl Screen for ApplicationsScreen {
    fn title(&self) -> String {
        "Applications".to_string()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn build(&mut self, grid: &mut Grid, cx: &mut ScreenContext<'_>) -> Result<(), ScreenError> {
        if self.applications.begin() {
            let services = cx.services().clone();
            let player = cx.player().clone();
            cx.load(
                async move {
                    let officer = services
                        .membership
                        .require_role(&player, GuildRole::Officer)
                        .await?;
                    let pending = services
                        .recruitment
                        .applications_for(&officer.guild_id)
                        .await?;
                    Ok::<_, ActionError>(pending)
                },
                |screen: &mut ApplicationsScreen, result, _cx: &mut ScreenContext<'_>| {
                    screen.applications.settle(result)
                },
            );
        }

        let Some(applications) = self.applications.ready() else {
            grid.fill_border();
            return render_status(grid, &self.applications);
        };
        let cells = page_of(applications, &self.pager)
            .iter()
            .map(Self::application_cell)
            .collect();
        render_list(
            grid,
            &self.pager,
            cells,
            applications.len(),
            "No pending applications",
        )
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
        let Some(CellPayload::Application(id)) = payload else {
            return;
        };

        let services = cx.services().clone();
        let actor = cx.player().clone();
        let id = id.clone();
        match click.kind {
            ClickKind::Primary => mutate(
                cx,
                async move { services.recruitment.approve_application(&actor, &id).await },
                |m: Member| format!("{} joined the guild.", m.player),
            ),
            ClickKind::Secondary => mutate(
                cx,
                async move { services.recruitment.reject_application(&actor, &id).await },
                |a: Application| format!("Application from {} rejected.", a.applicant),
            ),
            ClickKind::Tertiary => {}
        }
    }

    fn refresh(&mut self, _cx: &mut ScreenContext<'_>) {
        self.applications.invalidate();
    }
}
