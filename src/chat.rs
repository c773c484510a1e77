//! Chat processor
//!
//! Room membership, message routing and slash-command dispatch for a
//! logged-in client. Room events from other members arrive on a forwarder
//! task that writes into the same outbound queue as direct replies.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{Client, Outbound};
use crate::commands::{self, Command};
use crate::error::{ProcessError, StoreError};
use crate::message::{Action, Envelope};
use crate::processor::Processor;
use crate::room::{render_active_rooms, RoomSummary, Roster};
use crate::store::{is_reserved_key, Store, Subscription, ROOMS_SET};
use crate::types::{ClientId, SubscriptionId};

/// This session's live subscription to its room topic
///
/// Dropping it stops local delivery; `close` also tells the broker.
struct RoomSubscription {
    topic: String,
    id: SubscriptionId,
    forwarder: JoinHandle<()>,
}

impl RoomSubscription {
    fn start(subscription: Subscription, owner: ClientId, outbound: Outbound) -> Self {
        let Subscription {
            id,
            topic,
            receiver,
        } = subscription;
        let forwarder = tokio::spawn(forward_room_events(owner, receiver, outbound));
        Self {
            topic,
            id,
            forwarder,
        }
    }

    async fn close(self, store: &dyn Store) -> Result<(), StoreError> {
        self.forwarder.abort();
        store.unsubscribe(&self.topic, self.id).await
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Render room envelopes onto the owner's outbound queue
///
/// The owner's own envelopes are skipped.
async fn forward_room_events(
    owner: ClientId,
    mut receiver: mpsc::Receiver<String>,
    outbound: Outbound,
) {
    while let Some(payload) = receiver.recv().await {
        let envelope = match Envelope::decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Client {} dropped undecodable room event: {}", owner, e);
                continue;
            }
        };
        if envelope.is_from(owner) {
            continue;
        }
        debug!("Client {} received {:?} from {}", owner, envelope.action, envelope.username);
        if outbound.send(envelope.render()).await.is_err() {
            break;
        }
    }
    debug!("Room forwarder for {} ended", owner);
}

pub struct ChatProcessor {
    store: Arc<dyn Store>,
    default_room: String,
    /// Room this session is currently in
    room: Option<String>,
    subscription: Option<RoomSubscription>,
    finished: bool,
}

impl ChatProcessor {
    pub fn new(store: Arc<dyn Store>, default_room: impl Into<String>) -> Self {
        Self {
            store,
            default_room: default_room.into(),
            room: None,
            subscription: None,
            finished: false,
        }
    }

    /// Current room, if any
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    fn is_subscribed_to(&self, room: &str) -> bool {
        self.subscription.as_ref().is_some_and(|s| s.topic == room)
    }

    async fn dispatch(&mut self, client: &mut Client, name: &str, args: &str) -> Result<(), ProcessError> {
        let Some(command) = Command::lookup(name) else {
            client.send("unknown command").await?;
            return Ok(());
        };
        debug!("Client {} command '{}' with argument '{}'", client.id, name, args);

        match command {
            Command::Join => self.join(client, args).await,
            Command::Leave => self.leave(client, false).await,
            Command::Users => self.users(client).await,
            Command::Room => self.report_room(client).await,
            Command::Rooms => self.rooms(client).await,
            Command::Nick | Command::Whoami => {
                client
                    .send(format!("Your username is {}", client.display_name()))
                    .await?;
                Ok(())
            }
            Command::Help => {
                client.send(commands::help_text()).await?;
                Ok(())
            }
            Command::Quit => self.quit(client).await,
        }
    }

    /// Broadcast a chat line to the current room
    async fn talk(&mut self, client: &mut Client, text: &str) -> Result<(), ProcessError> {
        let Some(room) = self.room.clone() else {
            client.send("Please join a room first.").await?;
            client.send("Use command: /join <room>").await?;
            return Ok(());
        };
        info!("Client {} said to '{}': {}", client.id, room, text);
        self.publish(client, &room, Action::Talk, text).await
    }

    async fn publish(
        &self,
        client: &Client,
        room: &str,
        action: Action,
        text: &str,
    ) -> Result<(), ProcessError> {
        let payload = Envelope::new(client.id, client.display_name(), action, text).encode()?;
        self.store.publish(room, payload).await?;
        Ok(())
    }

    /// Switch to `room`
    ///
    /// Leaves the current room quietly first. A failure part way through
    /// entering is rolled back, so repeating the join is always safe.
    async fn join(&mut self, client: &mut Client, room: &str) -> Result<(), ProcessError> {
        let room = room.trim();
        if room.is_empty() {
            client.send("Usage: /join <room>").await?;
            return Ok(());
        }
        if is_reserved_key(room) {
            client.send("That room name is reserved").await?;
            return Ok(());
        }

        if self.room.as_deref() != Some(room) {
            self.leave(client, true).await?;
        }

        let name = client.display_name().to_string();
        if self.is_subscribed_to(room) && self.store.contains(room, &name).await? {
            client.send(format!("You are already in {}", room)).await?;
            return Ok(());
        }

        let mut announced = false;
        let entered = self.enter(client, room, &name, &mut announced).await;
        if let Err(err) = entered {
            self.abandon(client, room, &name, announced).await;
            return Err(err);
        }
        Ok(())
    }

    /// Enter `room`; `announced` is set once the join notice is out
    async fn enter(
        &mut self,
        client: &mut Client,
        room: &str,
        name: &str,
        announced: &mut bool,
    ) -> Result<(), ProcessError> {
        info!("Client {} ({}) joining '{}'", client.id, name, room);

        // a subscription without membership is stale; start over
        if let Some(stale) = self.subscription.take() {
            stale.close(self.store.as_ref()).await?;
        }
        self.room = Some(room.to_string());

        self.store.add(ROOMS_SET, room).await?;
        self.store.add(room, name).await?;

        client.send(format!("entering room: {}", room)).await?;
        self.users(client).await?;

        let notice = format!("* new user joined chat: {}", name);
        self.publish(client, room, Action::Join, &notice).await?;
        *announced = true;

        let subscription = self.store.subscribe(room).await?;
        self.subscription = Some(RoomSubscription::start(
            subscription,
            client.id,
            client.sender.clone(),
        ));

        client.send(format!("joined {}", room)).await?;
        Ok(())
    }

    /// Undo a partial join, best effort
    ///
    /// A join notice that already went out is retracted with a leave notice.
    async fn abandon(&mut self, client: &Client, room: &str, name: &str, announced: bool) {
        let id = client.id;
        warn!("Client {} could not enter '{}', rolling back", id, room);
        self.room = None;
        if announced {
            let notice = format!(" * user has left chat: {}", name);
            if let Err(e) = self.publish(client, room, Action::Leave, &notice).await {
                warn!("Client {} rollback leave notice for '{}' failed: {}", id, room, e);
            }
        }
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = subscription.close(self.store.as_ref()).await {
                warn!("Client {} rollback unsubscribe failed: {}", id, e);
            }
        }
        if let Err(e) = self.store.remove(room, name).await {
            warn!("Client {} rollback of '{}' membership failed: {}", id, room, e);
        }
    }

    /// Leave the current room
    ///
    /// Every cleanup step runs even if an earlier one fails; the first
    /// failure is reported afterwards.
    async fn leave(&mut self, client: &mut Client, quiet: bool) -> Result<(), ProcessError> {
        let Some(room) = self.room.take() else {
            return Ok(());
        };
        let subscription = self.subscription.take();
        let name = client.display_name().to_string();
        let notice = format!(" * user has left chat: {}", name);
        info!("Client {} ({}) left '{}'", client.id, name, room);

        let published = self.publish(client, &room, Action::Leave, &notice).await;
        let removed = self.store.remove(&room, &name).await;
        let unsubscribed = match subscription {
            Some(subscription) => subscription.close(self.store.as_ref()).await,
            None => Ok(()),
        };
        published?;
        removed?;
        unsubscribed?;

        if !quiet {
            client.send(format!("{} (** this is you)", notice)).await?;
        }
        Ok(())
    }

    async fn users(&self, client: &mut Client) -> Result<(), ProcessError> {
        let Some(room) = self.room.as_deref() else {
            client.send("You are not in a room").await?;
            return Ok(());
        };
        let roster = Roster::new(self.store.members(room).await?);
        client.send(roster.render_for(client.display_name())).await?;
        Ok(())
    }

    async fn report_room(&self, client: &mut Client) -> Result<(), ProcessError> {
        let reply = match self.room.as_deref() {
            Some(room) => format!("You are in room {}", room),
            None => "You are not in a room".to_string(),
        };
        client.send(reply).await?;
        Ok(())
    }

    async fn rooms(&self, client: &mut Client) -> Result<(), ProcessError> {
        let mut summaries = Vec::new();
        for name in self.store.members(ROOMS_SET).await? {
            let members = self.store.cardinality(&name).await?;
            summaries.push(RoomSummary { name, members });
        }
        client.send(render_active_rooms(&summaries)).await?;
        Ok(())
    }

    async fn quit(&mut self, client: &mut Client) -> Result<(), ProcessError> {
        self.finished = true;
        self.leave(client, false).await
    }
}

#[async_trait]
impl Processor for ChatProcessor {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn activate(&mut self, client: &mut Client) -> Result<(), ProcessError> {
        let room = self.default_room.clone();
        self.join(client, &room).await
    }

    async fn process(&mut self, client: &mut Client, line: &str) -> Result<(), ProcessError> {
        let msg = line.trim();
        if msg.is_empty() {
            return Ok(());
        }
        info!("Client {} ({}) sent '{}'", client.id, client.display_name(), msg);

        match commands::parse(msg) {
            Some((name, args)) => self.dispatch(client, &name, args).await,
            None => self.talk(client, msg).await,
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    async fn stop(&mut self, client: &mut Client) -> Result<(), ProcessError> {
        self.leave(client, false).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::broker::Broker;

    struct Member {
        chat: ChatProcessor,
        client: Client,
        rx: mpsc::Receiver<String>,
    }

    impl Member {
        async fn login(store: &Arc<dyn Store>, name: &str) -> Self {
            let (tx, rx) = mpsc::channel(64);
            let mut client = Client::new(ClientId::new(), tx);
            client.set_username(name);
            let mut member = Self {
                chat: ChatProcessor::new(store.clone(), "global"),
                client,
                rx,
            };
            member.chat.activate(&mut member.client).await.unwrap();
            member.drain();
            member
        }

        async fn say(&mut self, line: &str) {
            self.chat.process(&mut self.client, line).await.unwrap();
        }

        async fn next(&mut self) -> String {
            timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("timed out waiting for output")
                .expect("outbound closed")
        }

        async fn expect(&mut self, line: &str) {
            assert_eq!(self.next().await, line);
        }

        fn drain(&mut self) {
            while self.rx.try_recv().is_ok() {}
        }
    }

    fn store() -> Arc<dyn Store> {
        Arc::new(Broker::spawn(64))
    }

    #[tokio::test]
    async fn test_activate_joins_default_room() {
        let store = store();
        let (tx, mut rx) = mpsc::channel(64);
        let mut client = Client::new(ClientId::new(), tx);
        client.set_username("alice");
        let mut chat = ChatProcessor::new(store.clone(), "global");

        chat.activate(&mut client).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "entering room: global");
        assert_eq!(
            rx.recv().await.unwrap(),
            "room members: (1 users)\n * alice (this is you)"
        );
        assert_eq!(rx.recv().await.unwrap(), "joined global");
        assert_eq!(chat.room(), Some("global"));
        assert!(store.contains(ROOMS_SET, "global").await.unwrap());
        assert!(store.contains("global", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_users_listing() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;
        let _bob = Member::login(&store, "bob").await;
        alice.expect("* new user joined chat: bob").await;

        alice.say("/users").await;

        let listing = alice.next().await;
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(
            lines,
            vec!["room members: (2 users)", " * alice (this is you)", " * bob"]
        );
    }

    #[tokio::test]
    async fn test_talk_reaches_others_but_not_sender() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;
        let mut bob = Member::login(&store, "bob").await;
        let mut carol = Member::login(&store, "carol").await;
        alice.expect("* new user joined chat: bob").await;
        alice.expect("* new user joined chat: carol").await;
        bob.expect("* new user joined chat: carol").await;

        alice.say("hello room").await;
        assert_eq!(bob.next().await, "alice: hello room");
        assert_eq!(carol.next().await, "alice: hello room");

        // anything alice sees next must come from someone else
        bob.say("hi alice").await;
        assert_eq!(alice.next().await, "bob: hi alice");
    }

    #[tokio::test]
    async fn test_join_notice_reaches_existing_members() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;
        let _bob = Member::login(&store, "bob").await;

        assert_eq!(alice.next().await, "* new user joined chat: bob");
    }

    #[tokio::test]
    async fn test_join_twice_is_idempotent() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;
        let first_subscription = alice.chat.subscription.as_ref().map(|s| s.id);

        alice.say("/join global").await;

        assert_eq!(alice.next().await, "You are already in global");
        assert_eq!(store.cardinality("global").await.unwrap(), 1);
        assert_eq!(alice.chat.subscription.as_ref().map(|s| s.id), first_subscription);
        assert!(alice.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_switch_rooms_is_quiet() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;
        let mut bob = Member::login(&store, "bob").await;
        alice.expect("* new user joined chat: bob").await;

        bob.say("/join lobby").await;

        assert_eq!(bob.next().await, "entering room: lobby");
        assert_eq!(bob.next().await, "room members: (1 users)\n * bob (this is you)");
        assert_eq!(bob.next().await, "joined lobby");
        assert!(bob.rx.try_recv().is_err());

        assert_eq!(alice.next().await, " * user has left chat: bob");
        assert!(!store.contains("global", "bob").await.unwrap());
        assert!(store.contains("lobby", "bob").await.unwrap());
        assert_eq!(bob.chat.room(), Some("lobby"));
    }

    #[tokio::test]
    async fn test_leave_confirms_and_broadcasts() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;
        let mut bob = Member::login(&store, "bob").await;
        alice.expect("* new user joined chat: bob").await;

        bob.say("/leave").await;

        assert_eq!(bob.next().await, " * user has left chat: bob (** this is you)");
        assert_eq!(alice.next().await, " * user has left chat: bob");
        assert_eq!(bob.chat.room(), None);

        bob.say("anyone?").await;
        assert_eq!(bob.next().await, "Please join a room first.");
        assert_eq!(bob.next().await, "Use command: /join <room>");

        bob.say("/leave").await;
        bob.say("/room").await;
        assert_eq!(bob.next().await, "You are not in a room");
    }

    #[tokio::test]
    async fn test_rooms_hides_empty_rooms() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;
        let mut bob = Member::login(&store, "bob").await;

        bob.say("/join attic").await;
        bob.say("/join lobby").await;
        alice.expect("* new user joined chat: bob").await;
        alice.expect(" * user has left chat: bob").await;

        alice.say("/rooms").await;
        assert_eq!(
            alice.next().await,
            "Active rooms are:\n * global (1)\n * lobby (1)"
        );
        assert!(store.contains(ROOMS_SET, "attic").await.unwrap());
    }

    #[tokio::test]
    async fn test_simple_commands() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;

        alice.say("/room").await;
        assert_eq!(alice.next().await, "You are in room global");

        alice.say("/NICK").await;
        assert_eq!(alice.next().await, "Your username is alice");

        alice.say("/whoami").await;
        assert_eq!(alice.next().await, "Your username is alice");

        alice.say("/dance").await;
        assert_eq!(alice.next().await, "unknown command");

        alice.say("/help").await;
        assert!(alice.next().await.starts_with("Available commands:"));

        alice.say("/join").await;
        assert_eq!(alice.next().await, "Usage: /join <room>");

        alice.say("/join users").await;
        assert_eq!(alice.next().await, "That room name is reserved");
        assert_eq!(alice.chat.room(), Some("global"));

        alice.say("   ").await;
        assert!(alice.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_quit_leaves_and_finishes() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;
        let mut bob = Member::login(&store, "bob").await;
        alice.expect("* new user joined chat: bob").await;

        bob.say("/quit").await;

        assert!(bob.chat.is_finished());
        assert_eq!(bob.next().await, " * user has left chat: bob (** this is you)");
        assert_eq!(alice.next().await, " * user has left chat: bob");
        assert!(!store.contains("global", "bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_membership_is_rejoined() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;

        // membership vanished underneath the session
        store.remove("global", "alice").await.unwrap();
        alice.say("/join global").await;

        assert_eq!(alice.next().await, "entering room: global");
        assert!(store.contains("global", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_undecodable_event_is_skipped() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;

        store.publish("global", "not json".to_string()).await.unwrap();
        let bob_id = ClientId::new();
        let env = Envelope::new(bob_id, "bob", Action::Talk, "still here");
        store.publish("global", env.encode().unwrap()).await.unwrap();

        assert_eq!(alice.next().await, "bob: still here");
    }

    /// Shared store whose `subscribe` can be switched off
    struct FlakySubscribe {
        inner: Arc<dyn Store>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl Store for FlakySubscribe {
        async fn add(&self, set: &str, member: &str) -> Result<bool, StoreError> {
            self.inner.add(set, member).await
        }
        async fn remove(&self, set: &str, member: &str) -> Result<bool, StoreError> {
            self.inner.remove(set, member).await
        }
        async fn contains(&self, set: &str, member: &str) -> Result<bool, StoreError> {
            self.inner.contains(set, member).await
        }
        async fn cardinality(&self, set: &str) -> Result<usize, StoreError> {
            self.inner.cardinality(set).await
        }
        async fn members(&self, set: &str) -> Result<Vec<String>, StoreError> {
            self.inner.members(set).await
        }
        async fn publish(&self, topic: &str, payload: String) -> Result<usize, StoreError> {
            self.inner.publish(topic, payload).await
        }
        async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable);
            }
            self.inner.subscribe(topic).await
        }
        async fn unsubscribe(&self, topic: &str, id: SubscriptionId) -> Result<(), StoreError> {
            self.inner.unsubscribe(topic, id).await
        }
    }

    #[tokio::test]
    async fn test_failed_join_is_rolled_back() {
        let store = store();
        let mut alice = Member::login(&store, "alice").await;
        let flaky = Arc::new(FlakySubscribe {
            inner: store.clone(),
            failing: AtomicBool::new(true),
        });

        let (tx, rx) = mpsc::channel(64);
        let mut client = Client::new(ClientId::new(), tx);
        client.set_username("bob");
        let mut bob = Member {
            chat: ChatProcessor::new(flaky.clone(), "global"),
            client,
            rx,
        };

        let result = bob.chat.activate(&mut bob.client).await;
        assert!(matches!(
            result,
            Err(ProcessError::Store(StoreError::Unavailable))
        ));
        assert_eq!(bob.chat.room(), None);
        assert!(bob.chat.subscription.is_none());
        assert!(!store.contains("global", "bob").await.unwrap());

        bob.expect("entering room: global").await;
        assert!(bob.next().await.starts_with("room members: (2 users)"));
        assert!(bob.rx.try_recv().is_err());

        // the announcement is retracted
        alice.expect("* new user joined chat: bob").await;
        alice.expect(" * user has left chat: bob").await;

        flaky.failing.store(false, Ordering::SeqCst);
        bob.say("/join global").await;

        bob.expect("entering room: global").await;
        assert!(bob.next().await.starts_with("room members: (2 users)"));
        bob.expect("joined global").await;
        assert_eq!(bob.chat.room(), Some("global"));
        assert!(bob.chat.subscription.is_some());
        assert!(store.contains("global", "bob").await.unwrap());
        alice.expect("* new user joined chat: bob").await;
    }
}
