use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tether_core::reduce;
use tether_core::Clock;
use tether_core::Config;
use tether_core::ConversationId;
use tether_core::FetchFailure;
use tether_core::FETCH_ARCHIVED;
use tether_core::RuntimeAction;
use tether_core::SyncAction;
use tether_core::SyncEffect;
use tether_core::SyncState;
use tether_core::UserAction;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::contracts::ApiClient;
use crate::contracts::ApiError;
use crate::contracts::Router;
use crate::socket::spawn_transport;
use crate::socket::TokioClock;
use crate::socket::Transport;
use crate::socket::TransportEvent;
use crate::transport::resolve_ws_url;
use crate::transport::ConnectionMachine;
use crate::transport::TransportError;

/// How often timers (stall warning, notification expiry) are checked.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

enum Step {
    Action(SyncAction),
    Initialize { refetch: bool },
    /// Re-fetch messages if the selection survived re-initialization.
    RefetchSelected(Option<ConversationId>),
}

/// Owns the sync state of one client session and carries out the effects
/// the reducer asks for. Results come back as runtime actions, processed in
/// the order they were produced.
pub struct SyncSession<A, R> {
    state: SyncState,
    api: A,
    router: R,
    transport: Transport,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    clock: Arc<dyn Clock>,
    transport_task: Option<JoinHandle<()>>,
}

impl<A: ApiClient, R: Router> SyncSession<A, R> {
    /// Starts the socket task for `config` and wraps it in a session.
    pub fn connect(config: &Config, api: A, router: R) -> Result<Self, TransportError> {
        let url = resolve_ws_url(&config.server)?;
        let machine = ConnectionMachine::new(url, config.sync.reconnect_delay_ms);
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let task = spawn_transport(
            machine,
            Arc::clone(&clock),
            config.server.session_cookie.clone(),
        );
        let mut session = Self::with_transport(
            SyncState::with_config(config),
            api,
            router,
            task.transport,
            task.events,
            clock,
        );
        session.transport_task = Some(task.handle);
        Ok(session)
    }

    pub fn with_transport(
        state: SyncState,
        api: A,
        router: R,
        transport: Transport,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            api,
            router,
            transport,
            events,
            clock,
            transport_task: None,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub async fn initialize(&mut self) {
        self.drain(Step::Initialize { refetch: false }).await;
    }

    pub async fn dispatch(&mut self, action: SyncAction) {
        self.drain(Step::Action(action)).await;
    }

    /// Initializes, then serves socket events, user commands and timer ticks
    /// until the command channel closes or the transport stops. `on_change`
    /// runs after every processed input.
    pub async fn run<F>(
        mut self,
        mut commands: mpsc::Receiver<UserAction>,
        mut on_change: F,
    ) -> SyncState
    where
        F: FnMut(&SyncState),
    {
        self.initialize().await;
        on_change(&self.state);

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let action = tokio::select! {
                biased;
                event = self.events.recv() => match event {
                    Some(TransportEvent::Phase(phase)) => {
                        SyncAction::Runtime(RuntimeAction::ConnectionChanged(phase))
                    }
                    Some(TransportEvent::Frame(text)) => {
                        SyncAction::Runtime(RuntimeAction::FrameReceived(text))
                    }
                    None => {
                        tracing::warn!("transport stopped");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => SyncAction::User(command),
                    None => {
                        tracing::debug!("command channel closed");
                        break;
                    }
                },
                _ = tick.tick() => SyncAction::Runtime(RuntimeAction::Tick),
            };
            self.dispatch(action).await;
            on_change(&self.state);
        }
        std::mem::take(&mut self.state)
    }

    async fn drain(&mut self, first: Step) {
        let mut queue = VecDeque::from([first]);
        while let Some(step) = queue.pop_front() {
            match step {
                Step::Action(action) => {
                    let effects = reduce(&mut self.state, action, self.clock.now_ms());
                    for effect in effects {
                        self.execute(effect, &mut queue).await;
                    }
                }
                Step::Initialize { refetch } => {
                    let previous = self.state.selection.conversation_id;
                    match self.api.get_initial_data().await {
                        Ok(data) => {
                            queue.push_back(runtime(RuntimeAction::InitialDataLoaded(data)));
                            if refetch {
                                queue.push_back(Step::RefetchSelected(previous));
                            }
                        }
                        Err(err) => {
                            let failure = match err.redirect() {
                                Some(route) => {
                                    tracing::info!(error = %err, "initial data requires sign-in");
                                    self.router.navigate(route);
                                    FetchFailure::AuthRedirect
                                }
                                None => FetchFailure::Unreachable(err.to_string()),
                            };
                            queue.push_back(runtime(RuntimeAction::InitialDataFailed(failure)));
                        }
                    }
                }
                Step::RefetchSelected(previous) => {
                    let Some(conversation) = self.state.selected_conversation() else {
                        continue;
                    };
                    if Some(conversation.id) != previous {
                        continue;
                    }
                    let conversation_id = conversation.id;
                    self.execute(
                        SyncEffect::FetchMessages {
                            conversation_id,
                            archived: FETCH_ARCHIVED,
                        },
                        &mut queue,
                    )
                    .await;
                }
            }
        }
    }

    async fn execute(&mut self, effect: SyncEffect, queue: &mut VecDeque<Step>) {
        let outcome = match effect {
            SyncEffect::Navigate(route) => {
                self.router.navigate(route);
                return;
            }
            SyncEffect::Reinitialize => {
                tracing::info!("server requested reload");
                queue.push_back(Step::Initialize { refetch: true });
                return;
            }
            SyncEffect::SendFrame(payload) => {
                if let Err(err) = self.transport.send(&payload) {
                    queue.push_back(runtime(RuntimeAction::SendFailed(err.to_string())));
                }
                return;
            }
            SyncEffect::SaveAppState(app_state) => self
                .api
                .save_state(&app_state)
                .await
                .map(|()| None)
                .map_err(|err| ("save app state", err)),
            SyncEffect::FetchMessages {
                conversation_id,
                archived,
            } => self
                .api
                .get_messages(conversation_id, archived)
                .await
                .map(|messages| {
                    Some(RuntimeAction::MessagesLoaded {
                        conversation_id,
                        messages,
                    })
                })
                .map_err(|err| ("load messages", err)),
            SyncEffect::FetchConversationSettings(conversation_id) => self
                .api
                .get_conversation_settings(conversation_id)
                .await
                .map(|settings| {
                    Some(RuntimeAction::ConversationSettingsLoaded {
                        conversation_id,
                        settings,
                    })
                })
                .map_err(|err| ("load conversation settings", err)),
            SyncEffect::SaveConversationSettings {
                conversation_id,
                settings,
            } => self
                .api
                .save_conversation_settings(conversation_id, &settings)
                .await
                .map(|()| None)
                .map_err(|err| ("save conversation settings", err)),
            SyncEffect::CreateSpace => self
                .api
                .create_space()
                .await
                .map(|space| Some(RuntimeAction::SpaceCreated(space)))
                .map_err(|err| ("create space", err)),
            SyncEffect::UpdateSpace { space_id, name } => self
                .api
                .update_space(space_id, &name)
                .await
                .map(|()| None)
                .map_err(|err| ("rename space", err)),
            SyncEffect::DeleteSpace(space_id) => self
                .api
                .delete_space(space_id)
                .await
                .map(|()| Some(RuntimeAction::SpaceDeleted(space_id)))
                .map_err(|err| ("delete space", err)),
            SyncEffect::CreateConversation(space_id) => self
                .api
                .create_conversation(space_id)
                .await
                .map(|conversation| Some(RuntimeAction::ConversationCreated(conversation)))
                .map_err(|err| ("create conversation", err)),
            SyncEffect::DeleteConversation(conversation_id) => self
                .api
                .delete_conversation(conversation_id)
                .await
                .map(|()| Some(RuntimeAction::ConversationDeleted(conversation_id)))
                .map_err(|err| ("delete conversation", err)),
            SyncEffect::ArchiveMessages(conversation_id) => self
                .api
                .archive_messages(conversation_id)
                .await
                .map(|()| Some(RuntimeAction::MessagesArchived(conversation_id)))
                .map_err(|err| ("archive messages", err)),
        };

        match outcome {
            Ok(Some(action)) => queue.push_back(runtime(action)),
            Ok(None) => {}
            Err((context, err)) => self.request_failed(context, err, queue),
        }
    }

    /// Auth failures on any request send the user away; everything else
    /// becomes an error notification.
    fn request_failed(&self, context: &'static str, err: ApiError, queue: &mut VecDeque<Step>) {
        if let Some(route) = err.redirect() {
            tracing::info!(context, error = %err, "request requires sign-in");
            self.router.navigate(route);
            return;
        }
        queue.push_back(runtime(RuntimeAction::RequestFailed {
            context,
            message: err.to_string(),
        }));
    }
}

impl<A, R> Drop for SyncSession<A, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.transport_task.take() {
            handle.abort();
        }
    }
}

fn runtime(action: RuntimeAction) -> Step {
    Step::Action(SyncAction::Runtime(action))
}
