//! Paged list of every guild with member counts

use super::{list_size, mutate, per_page, render_list, render_status, Loadable};
use crate::config::SessionConfig;
use crate::core_guild::directory::{directory_page, GuildSummary};
use crate::core_guild::recruit::Application;
use crate::core_session::{
    Cell, CellPayload, Click, ClickKind, Grid, Pager, Screen, ScreenContext, ScreenError,
};

#[derive(Debug, Clone)]
pub struct DirectoryPage {
    pub rows: Vec<GuildSummary>,
    pub total: usize,
}

/// Left click on a guild sends an application
pub struct DirectoryScreen {
    size: usize,
    pager: Pager,
    page: Loadable<DirectoryPage>,
}

impl DirectoryScreen {
    pub fn new(config: &SessionConfig) -> Self {
        let size = list_size(config);
        Self {
            size,
            pager: Pager::new(per_page(size)),
            page: Loadable::NotLoaded,
        }
    }

    pub fn page(&self) -> Option<&DirectoryPage> {
        self.page.ready()
    }

    fn guild_cell(summary: &GuildSummary) -> Cell {
        let guild = &summary.guild;
        let mut cell = Cell::new(
            guild.banner.clone().unwrap_or_else(|| "WHITE_BANNER".to_string()),
            guild.display_name(),
        )
        .lore(format!("Members: {}", summary.occupancy()))
        .lore(format!("Level {}", guild.level));
        if let Some(description) = &guild.description {
            cell = cell.lore(description.clone());
        }
        if guild.frozen {
            cell = cell.lore("Frozen");
        }
        cell.lore("Left click: apply to join")
            .payload(CellPayload::Guild(guild.id.clone()))
    }
}

impl Screen for DirectoryScreen {
    fn title(&self) -> String {
        format!("Guilds (page {})", self.pager.page + 1)
    }

    fn size(&self) -> usize {
        self.size
    }

    fn build(&mut self, grid: &mut Grid, cx: &mut ScreenContext<'_>) -> Result<(), ScreenError> {
        if self.page.begin() {
            let store = cx.services().store.clone();
            let (offset, limit) = (self.pager.offset(), self.pager.per_page);
            cx.load(
                async move {
                    directory_page(store.as_ref(), offset, limit)
                        .await
                        .map(|(rows, total)| DirectoryPage { rows, total })
                },
                |screen: &mut DirectoryScreen, result, _cx: &mut ScreenContext<'_>| {
                    screen.page.settle(result)
                },
            );
        }

        let Some(page) = self.page.ready() else {
            grid.fill_border();
            return render_status(grid, &self.page);
        };
        let cells = page.rows.iter().map(Self::guild_cell).collect();
        render_list(grid, &self.pager, cells, page.total, "No guilds yet")
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
        let (Some(CellPayload::Guild(guild)), ClickKind::Primary) = (payload, click.kind) else {
            return;
        };

        let services = cx.services().clone();
        let player = cx.player().clone();
        let guild = guild.clone();
        mutate(
            cx,
            async move { services.recruitment.apply(&player, &guild, "").await },
            |_: Application| "Application sent.".to_string(),
        );
    }

    fn refresh(&mut self, _cx: &mut ScreenContext<'_>) {
        self.page.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_guild::types::PlayerId;
    use crate::core_session::SessionHandle;
    use crate::core_store::GuildStore;
    use crate::test_utils::{
        next_message, next_screen_with, seeded_services, slot_of, Seeded, TestGuildBuilder,
    };

    #[tokio::test]
    async fn test_pages_and_apply() {
        let Seeded {
            services, store, ..
        } = seeded_services().await;
        for name in ["Cedar", "Dune", "Ember", "Frost", "Grove", "Harbor", "Iris"] {
            TestGuildBuilder::new(name).create(store.as_ref()).await.unwrap();
        }
        let config = SessionConfig {
            page_rows: 3,
            ..SessionConfig::default()
        };
        let (handle, _task) = SessionHandle::new(services.clone(), config.clone());
        let drifter = PlayerId::new("drifter");

        handle.open(&drifter, DirectoryScreen::new(&config)).await.unwrap();
        let first = next_screen_with(&handle, "Next page").await.unwrap();
        assert_eq!(first.title, "Guilds (page 1)");
        assert_eq!(slot_of(&first, "Next page"), Some(26));
        assert!(slot_of(&first, "Alpha").is_some());
        assert!(slot_of(&first, "Harbor").is_none());

        handle.click(&drifter, Click::primary(26)).await.unwrap();
        let second = next_screen_with(&handle, "Iris").await.unwrap();
        assert_eq!(second.title, "Guilds (page 2)");
        assert!(slot_of(&second, "Previous page").is_some());
        assert!(slot_of(&second, "Next page").is_none());

        let slot = slot_of(&second, "Iris").unwrap();
        handle.click(&drifter, Click::primary(slot)).await.unwrap();
        assert_eq!(next_message(&handle).await.unwrap(), "Application sent.");
        let pending = store.applications_by(&drifter).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}
