//! Terminal front end: the render sink plus the event loop that feeds a
//! [`Session`] with terminal input and service events.

use magpie_client::{Effect, Session};
use magpie_common::{ClientEventTx, ServerEventRx};
use tokio::sync::mpsc;

mod keymap;
mod view;

pub use keymap::{parse_key_sequence, Action, KeyCode, KeyEvent, Keymap};
pub use view::ChatView;

#[derive(Debug, thiserror::Error)]
pub enum TuiError {
    #[error("terminal I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport channel closed")]
    TransportClosed,
}

/// Runs the chat UI until the user quits or either channel closes.
pub async fn run(
    session: Session,
    server_rx: ServerEventRx,
    transport_tx: ClientEventTx,
) -> Result<(), TuiError> {
    let terminal = ratatui::init();
    let result = run_inner(terminal, session, server_rx, transport_tx).await;
    ratatui::restore();
    result
}

#[derive(Debug)]
enum UiEvent {
    /// A key that belongs to the input line.
    Input(KeyEvent),
    /// A completed key binding.
    Action(Action),
}

async fn run_inner(
    mut term: ratatui::DefaultTerminal,
    mut session: Session,
    mut server_rx: ServerEventRx,
    transport_tx: ClientEventTx,
) -> Result<(), TuiError> {
    use futures::future::Either;

    let mut view = ChatView::new(session.rooms().to_vec());

    let (keys_tx, mut keys_rx) = mpsc::unbounded_channel();
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_key_events(keys_tx));
    tokio::spawn(async move {
        let keymap = Keymap::default();
        keymap
            .run(
                &mut keys_rx,
                |keys| {
                    for key in keys {
                        let _ = ui_tx.send(UiEvent::Input(*key));
                    }
                },
                |action| {
                    let _ = ui_tx.send(UiEvent::Action(action));
                },
            )
            .await;
    });

    loop {
        term.draw(|frame| frame.render_widget(&view, frame.area()))?;
        match futures::future::select(std::pin::pin!(ui_rx.recv()), std::pin::pin!(server_rx.recv()))
            .await
        {
            Either::Left((Some(UiEvent::Action(Action::Quit)), _)) => break,
            Either::Left((Some(event), _)) => {
                handle_ui_event(event, &mut session, &mut view, &transport_tx)?
            }
            Either::Right((Some(event), _)) => {
                let effects = session.handle_server_event(event);
                apply_effects(effects, &mut view, &transport_tx)?;
            }
            Either::Left((None, _)) => {
                tracing::info!("ui event stream stopped, shutting down");
                break;
            }
            Either::Right((None, _)) => {
                tracing::info!("server event stream stopped, shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn handle_ui_event(
    event: UiEvent,
    session: &mut Session,
    view: &mut ChatView,
    transport_tx: &ClientEventTx,
) -> Result<(), TuiError> {
    match event {
        UiEvent::Input(key) => view.apply_key(key),
        UiEvent::Action(action) => {
            let effects = match action {
                Action::Submit => {
                    let line = view.input_line().to_owned();
                    session.submit_input(&line)
                }
                Action::JoinRoom(index) => session.join_room_by_index(index),
                Action::CycleRoster => {
                    view.cycle_roster_selection();
                    Vec::new()
                }
                Action::ActivateRoster => match view.roster_selection() {
                    Some(index) => session.activate_roster_entry(index),
                    None => Vec::new(),
                },
                // handled by the loop
                Action::Quit => Vec::new(),
            };
            apply_effects(effects, view, transport_tx)?;
        }
    }
    Ok(())
}

fn apply_effects(
    effects: Vec<Effect>,
    view: &mut ChatView,
    transport_tx: &ClientEventTx,
) -> Result<(), TuiError> {
    for effect in effects {
        match effect {
            Effect::Send(event) => transport_tx
                .send(event)
                .map_err(|_| TuiError::TransportClosed)?,
            Effect::Render(command) => view.apply(command),
        }
    }
    Ok(())
}

async fn forward_key_events(keys_tx: mpsc::UnboundedSender<KeyEvent>) {
    use crossterm::event::{Event, KeyEventKind};
    use futures::stream::StreamExt;

    let mut events = crossterm::event::EventStream::new();
    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                if keys_tx.send(KeyEvent::from(key)).is_err() {
                    break;
                }
            }
            Ok(event) => tracing::trace!(?event, "ignoring terminal event"),
            Err(err) => tracing::warn!("terminal event error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_client::RenderCommand;
    use magpie_common::ClientEvent;

    #[tokio::test]
    async fn apply_effects_splits_sends_from_renders() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut view = ChatView::default();
        apply_effects(
            vec![
                Effect::Send(ClientEvent::Join {
                    room: "General".to_owned(),
                }),
                Effect::Render(RenderCommand::SetInput("@bob ".to_owned())),
            ],
            &mut view,
            &tx,
        )
        .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(ClientEvent::Join {
                room: "General".to_owned()
            })
        );
        assert_eq!(view.input_line(), "@bob ");
    }

    #[tokio::test]
    async fn apply_effects_reports_a_closed_transport() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut view = ChatView::default();
        let result = apply_effects(
            vec![Effect::Send(ClientEvent::Leave {
                room: "General".to_owned(),
            })],
            &mut view,
            &tx,
        );
        assert!(matches!(result, Err(TuiError::TransportClosed)));
    }
}
