//! Diplomatic relations of the viewer's guild

use super::actions::{answer_relation, describe_relation, shift_relation, ActionError};
use super::confirm::ConfirmScreen;
use super::{list_size, mutate, page_of, per_page, render_list, render_status, Loadable};
use crate::config::SessionConfig;
use crate::core_guild::relation::{Relation, RelationStatus, RelationType};
use crate::core_guild::relations::Resolution;
use crate::core_guild::services::GuildServices;
use crate::core_guild::types::{GuildId, PlayerId, RelationId};
use crate::core_session::{
    ActionTarget, Cell, CellPayload, Click, ClickKind, Grid, Pager, Screen, ScreenContext,
    ScreenError,
};
use futures::future::join_all;

/// A relation as seen from one side
#[derive(Debug, Clone)]
pub struct RelationRow {
    pub relation: Relation,
    pub other_name: String,
    /// The viewer's guild received the proposal
    pub incoming: bool,
}

async fn load_rows(services: &GuildServices, player: &PlayerId) -> Result<Vec<RelationRow>, ActionError> {
    let member = services.membership.member(player).await?;
    let mine = member.guild_id;
    let relations = services.relations.relations_of(&mine).await?;

    let others: Vec<GuildId> = relations
        .iter()
        .filter_map(|r| r.other_guild(&mine).cloned())
        .collect();
    let names = join_all(others.iter().map(|id| services.guilds.guild(id))).await;

    Ok(relations
        .into_iter()
        .zip(others.iter().zip(names))
        .map(|(relation, (other, name))| RelationRow {
            incoming: relation.guild_b == mine,
            other_name: name.map(|g| g.name).unwrap_or_else(|_| other.to_string()),
            relation,
        })
        .collect())
}

/// Left click accepts a proposal, right click cancels or ends a relation,
/// middle click de-escalates a war or truce
pub struct RelationsScreen {
    size: usize,
    pager: Pager,
    rows: Loadable<Vec<RelationRow>>,
}

impl RelationsScreen {
    pub fn new(config: &SessionConfig) -> Self {
        let size = list_size(config);
        Self {
            size,
            pager: Pager::new(per_page(size)),
            rows: Loadable::NotLoaded,
        }
    }

    fn row(&self, id: &RelationId) -> Option<&RelationRow> {
        self.rows.ready()?.iter().find(|r| &r.relation.id == id)
    }

    fn relation_cell(row: &RelationRow) -> Cell {
        let relation = &row.relation;
        let icon = match relation.relation_type {
            RelationType::Ally => "EMERALD",
            RelationType::Truce => "WHITE_BANNER",
            RelationType::Neutral => "STONE",
            RelationType::Enemy => "REDSTONE",
            RelationType::War => "IRON_SWORD",
        };
        let mut cell = Cell::new(icon, row.other_name.clone())
            .lore(format!(
                "{} ({})",
                relation.relation_type.as_str(),
                relation.status.as_str()
            ))
            .payload(CellPayload::Relation(relation.id.clone()));

        match relation.status {
            RelationStatus::Pending if row.incoming => {
                cell = cell
                    .lore("Left click: accept")
                    .lore("Right click: decline");
            }
            RelationStatus::Pending => cell = cell.lore("Right click: withdraw"),
            _ => {
                cell = cell.lore("Right click: end relation");
                match relation.relation_type {
                    RelationType::War => cell = cell.lore("Middle click: offer truce"),
                    RelationType::Truce => cell = cell.lore("Middle click: make peace"),
                    _ => {}
                }
            }
        }
        cell
    }
}

impl Screen for RelationsScreen {
    fn title(&self) -> String {
        "Guild relations".to_string()
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
                |screen: &mut RelationsScreen, result, _cx: &mut ScreenContext<'_>| {
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
            .map(Self::relation_cell)
            .collect();
        render_list(grid, &self.pager, cells, rows.len(), "No relations")
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
        let Some(CellPayload::Relation(id)) = payload else {
            return;
        };
        let Some(row) = self.row(id).cloned() else {
            return;
        };

        let services = cx.services().clone();
        let actor = cx.player().clone();
        let id = id.clone();
        let other = row.other_name.clone();
        let status = row.relation.status;
        let relation_type = row.relation.relation_type;

        match click.kind {
            ClickKind::Primary if status == RelationStatus::Pending && row.incoming => mutate(
                cx,
                async move { answer_relation(&services, &actor, &id, Resolution::Active).await },
                move |r: Relation| describe_relation(&r, &other),
            ),
            ClickKind::Secondary if status == RelationStatus::Pending => mutate(
                cx,
                async move { answer_relation(&services, &actor, &id, Resolution::Cancelled).await },
                move |_: Relation| format!("Proposal with {} withdrawn.", other),
            ),
            ClickKind::Secondary => {
                let config = cx.config().clone();
                cx.open(
                    ConfirmScreen::new(ActionTarget::RevokeRelation(id)).return_to(move || {
                        Box::new(RelationsScreen::new(&config)) as Box<dyn Screen>
                    }),
                );
            }
            ClickKind::Tertiary if status == RelationStatus::Active => {
                let next = match relation_type {
                    RelationType::War => RelationType::Truce,
                    RelationType::Truce => RelationType::Neutral,
                    _ => return,
                };
                mutate(
                    cx,
                    async move { shift_relation(&services, &actor, &id, next).await },
                    move |r: Relation| describe_relation(&r, &other),
                );
            }
            _ => {}
        }
    }

    fn refresh(&mut self, _cx: &mut ScreenContext<'_>) {
        self.rows.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_screens::set_relation;
    use crate::core_session::SessionHandle;
    use crate::test_utils::{next_message, next_screen_with, seeded_services, slot_of, Seeded};

    #[tokio::test]
    async fn test_accept_incoming_proposal() {
        let Seeded {
            services,
            alpha,
            beta,
            ..
        } = seeded_services().await;
        let proposal = set_relation(&services, &alpha.leader, "Beta", RelationType::Ally)
            .await
            .unwrap();

        let config = SessionConfig::default();
        let (handle, _task) = SessionHandle::new(services.clone(), config.clone());
        handle.open(&beta.officer, RelationsScreen::new(&config)).await.unwrap();
        let view = next_screen_with(&handle, "Alpha").await.unwrap();
        let slot = slot_of(&view, "Alpha").unwrap();

        handle.click(&beta.officer, Click::primary(slot)).await.unwrap();
        assert_eq!(
            next_message(&handle).await.unwrap(),
            "Your guild is now ally with Alpha."
        );
        let stored = services.store.relation(&proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RelationStatus::Active);
    }

    #[tokio::test]
    async fn test_outgoing_proposal_cannot_be_accepted() {
        let Seeded {
            services, alpha, ..
        } = seeded_services().await;
        let proposal = set_relation(&services, &alpha.leader, "Beta", RelationType::Truce)
            .await
            .unwrap();

        let config = SessionConfig::default();
        let (handle, _task) = SessionHandle::new(services.clone(), config.clone());
        handle.open(&alpha.leader, RelationsScreen::new(&config)).await.unwrap();
        let view = next_screen_with(&handle, "Beta").await.unwrap();
        let slot = slot_of(&view, "Beta").unwrap();

        // Left click does nothing on our own proposal; right click withdraws it
        handle.click(&alpha.leader, Click::primary(slot)).await.unwrap();
        handle
            .click(&alpha.leader, Click { slot, kind: ClickKind::Secondary })
            .await
            .unwrap();
        assert_eq!(
            next_message(&handle).await.unwrap(),
            "Proposal with Beta withdrawn."
        );
        let stored = services.store.relation(&proposal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RelationStatus::Cancelled);
    }
}
