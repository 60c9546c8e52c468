use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{navigation::ClientView, room_session::WeakSessionController};
use crate::event::{RoomEvent, RoomEventError, RoomEventHandler};
use crate::room::models::RoomStatus;
use crate::session::ClientRole;

/// Reacts to room events on behalf of the owning session
pub struct SessionEventRouter {
    controller: WeakSessionController,
}

impl SessionEventRouter {
    pub fn new(controller: WeakSessionController) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl RoomEventHandler for SessionEventRouter {
    async fn handle_room_event(
        &self,
        room_id: &str,
        event: RoomEvent,
    ) -> Result<(), RoomEventError> {
        let controller = self.controller.upgrade().ok_or(RoomEventError::SessionGone)?;

        match event {
            RoomEvent::StatusChanged {
                to: RoomStatus::Playing,
                ..
            } => {
                let Some(active) = controller.active_room().await else {
                    return Ok(());
                };
                if active.room_id != room_id
                    || active.role != ClientRole::Player
                    || active.view != ClientView::Lobby
                {
                    return Ok(());
                }

                let intent = controller.prepare_navigation().await?;
                info!(room_id = %room_id, url = %intent.url, "Game started, navigating to game view");
                controller
                    .event_bus()
                    .emit_to_room(room_id, RoomEvent::NavigateToGame { intent })
                    .await;
            }
            RoomEvent::HostChanged { host_id } => {
                controller.sync_host_role(room_id, &host_id).await?;
            }
            event if event.ends_membership() => {
                debug!(room_id = %room_id, event_type = event.event_type(), "Membership ended");
                let closed = matches!(
                    event,
                    RoomEvent::RoomClosed {
                        status: RoomStatus::Closed,
                        ..
                    }
                );
                // release detaches this subscription, so run it on its own task
                let room_id = room_id.to_string();
                tokio::spawn(async move {
                    let released = if closed {
                        controller.abandon(&room_id).await
                    } else {
                        controller.release(&room_id).await
                    };
                    if let Err(e) = released {
                        warn!(room_id = %room_id, error = %e, "Failed to release room session");
                    }
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "SessionEventRouter"
    }
}
