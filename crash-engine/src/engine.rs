use crate::config::GameConfig;
use crate::error::{GameError, Result};
use crate::events::{EventBus, GameEvent};
use crate::fairness::{RandomSeedSource, SeedSource};
use crate::persistence::{spawn_worker, PersistOp, RoundRepository};
use crate::round::{Round, RoundPublicState, RoundSummary};
use crate::settlement::{BetReceipt, CashoutReceipt, SettlementService};
use crash_core::{
    Asset, BalanceStore, CoreError, PlayerId, PriceOracle, PriceQuote, RoundStatus,
    TransactionLog,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Far enough ahead that a disabled timer never fires.
const IDLE_WAKE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Collaborators the engine is built from.
pub struct EngineContext {
    pub balances: Arc<BalanceStore>,
    pub transactions: Arc<TransactionLog>,
    pub oracle: Arc<dyn PriceOracle>,
    pub repository: Arc<dyn RoundRepository>,
    pub seeds: Box<dyn SeedSource>,
    pub events: EventBus,
}

impl EngineContext {
    pub fn new(
        balances: Arc<BalanceStore>,
        transactions: Arc<TransactionLog>,
        oracle: Arc<dyn PriceOracle>,
        repository: Arc<dyn RoundRepository>,
    ) -> Self {
        Self {
            balances,
            transactions,
            oracle,
            repository,
            seeds: Box::new(RandomSeedSource),
            events: EventBus::default(),
        }
    }

    pub fn with_seeds(mut self, seeds: impl SeedSource + 'static) -> Self {
        self.seeds = Box::new(seeds);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }
}

enum Command {
    PlaceBet {
        player_id: PlayerId,
        usd_amount: f64,
        quote: PriceQuote,
        reply: oneshot::Sender<Result<BetReceipt>>,
    },
    OpenBetAsset {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<Asset>>,
    },
    Cashout {
        player_id: PlayerId,
        quote: PriceQuote,
        reply: oneshot::Sender<Result<CashoutReceipt>>,
    },
    CurrentRound {
        reply: oneshot::Sender<Result<RoundPublicState>>,
    },
    History {
        limit: usize,
        reply: oneshot::Sender<Vec<RoundSummary>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable client of a running [`RoundEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    oracle: Arc<dyn PriceOracle>,
    events: EventBus,
}

impl EngineHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| GameError::EngineStopped)?;
        rx.await.map_err(|_| GameError::EngineStopped)
    }

    async fn quote(&self, asset: Asset) -> Result<PriceQuote> {
        self.oracle.get_price(asset).await.map_err(|e| match e {
            CoreError::PriceUnavailable { asset, reason } => {
                GameError::PriceUnavailable { asset, reason }
            }
            other => GameError::PriceUnavailable {
                asset,
                reason: other.to_string(),
            },
        })
    }

    /// Stake `usd_amount` worth of `asset` on the current round.
    pub async fn place_bet(
        &self,
        player_id: PlayerId,
        usd_amount: f64,
        asset: Asset,
    ) -> Result<BetReceipt> {
        if !(usd_amount.is_finite() && usd_amount > 0.0) {
            return Err(GameError::validation("Bet amount must be a positive number"));
        }

        let quote = self.quote(asset).await?;
        self.request(|reply| Command::PlaceBet {
            player_id,
            usd_amount,
            quote,
            reply,
        })
        .await?
    }

    /// Cash out the player's open bet at the multiplier in effect when the
    /// engine accepts the request.
    pub async fn request_cashout(&self, player_id: PlayerId) -> Result<CashoutReceipt> {
        let asset = self
            .request(|reply| Command::OpenBetAsset { player_id, reply })
            .await??;
        let quote = self.quote(asset).await?;

        self.request(|reply| Command::Cashout {
            player_id,
            quote,
            reply,
        })
        .await?
    }

    pub async fn current_round(&self) -> Result<RoundPublicState> {
        self.request(|reply| Command::CurrentRound { reply }).await?
    }

    /// Finished rounds, most recent first.
    pub async fn round_history(&self, limit: usize) -> Result<Vec<RoundSummary>> {
        self.request(|reply| Command::History { limit, reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    /// Stop the engine once queued writes have reached the repository.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    CreateRound,
    GoLive,
}

/// Single owner of round state. Ticks, round transitions and settlement
/// all run on this task, one at a time.
pub struct RoundEngine {
    config: GameConfig,
    current: Option<Round>,
    history: VecDeque<RoundSummary>,
    /// A round whose creation is waiting on a persistence retry.
    staged: Option<(Round, u32)>,
    last_round_number: u64,
    wake: Option<(Instant, Wake)>,
    ticks: u32,
    settlement: SettlementService,
    repository: Arc<dyn RoundRepository>,
    seeds: Box<dyn SeedSource>,
    events: EventBus,
    commands: mpsc::Receiver<Command>,
    worker: JoinHandle<()>,
}

impl RoundEngine {
    /// Start the engine task. The first round is created right away,
    /// numbered after the latest persisted one.
    pub async fn spawn(config: GameConfig, ctx: EngineContext) -> Result<EngineHandle> {
        config.validate()?;

        let last_round_number = match ctx.repository.latest_round_number().await {
            Ok(latest) => latest.unwrap_or(0),
            Err(e) => {
                tracing::warn!("Failed to load latest round number, starting from 0: {}", e);
                0
            }
        };

        let (queue, worker) = spawn_worker(ctx.repository.clone());
        let (tx, rx) = mpsc::channel(config.command_capacity);

        let handle = EngineHandle {
            commands: tx,
            oracle: ctx.oracle,
            events: ctx.events.clone(),
        };

        let engine = RoundEngine {
            current: None,
            history: VecDeque::new(),
            staged: None,
            last_round_number,
            wake: Some((Instant::now(), Wake::CreateRound)),
            ticks: 0,
            settlement: SettlementService::new(ctx.balances, ctx.transactions, queue),
            repository: ctx.repository,
            seeds: ctx.seeds,
            events: ctx.events,
            commands: rx,
            worker,
            config,
        };

        tracing::info!("Starting round engine after round {}", last_round_number);
        tokio::spawn(engine.run());

        Ok(handle)
    }

    async fn run(mut self) {
        let period = self.config.tick_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown_reply = loop {
            let was_live = self.is_live();
            let wake_at = self
                .wake
                .map(|(at, _)| at)
                .unwrap_or_else(|| Instant::now() + IDLE_WAKE);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Some(reply) = self.handle_command(command) {
                            break Some(reply);
                        }
                    }
                    None => break None,
                },
                _ = ticker.tick(), if was_live => self.on_tick(),
                _ = tokio::time::sleep_until(wake_at), if self.wake.is_some() => self.on_wake().await,
            }

            if !was_live && self.is_live() {
                ticker.reset();
            }
        };

        let RoundEngine {
            settlement, worker, ..
        } = self;
        // Closing the queue lets the worker drain and exit
        drop(settlement);
        if let Err(e) = worker.await {
            tracing::error!("Persistence worker failed: {}", e);
        }
        tracing::info!("Round engine stopped");

        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn is_live(&self) -> bool {
        matches!(&self.current, Some(round) if round.status() == RoundStatus::Live)
    }

    fn schedule(&mut self, after: Duration, wake: Wake) {
        self.wake = Some((Instant::now() + after, wake));
    }

    /// Serve one command. Returns the reply channel when the command asks
    /// the engine to stop.
    fn handle_command(&mut self, command: Command) -> Option<oneshot::Sender<()>> {
        match command {
            Command::PlaceBet {
                player_id,
                usd_amount,
                quote,
                reply,
            } => {
                let _ = reply.send(self.place_bet(player_id, usd_amount, &quote));
            }
            Command::OpenBetAsset { player_id, reply } => {
                let _ = reply.send(self.open_bet_asset(player_id));
            }
            Command::Cashout {
                player_id,
                quote,
                reply,
            } => {
                let _ = reply.send(self.cash_out(player_id, &quote));
            }
            Command::CurrentRound { reply } => {
                let state = self
                    .current
                    .as_ref()
                    .map(Round::public_state)
                    .ok_or_else(|| GameError::round_state("No round has started yet"));
                let _ = reply.send(state);
            }
            Command::History { limit, reply } => {
                let _ = reply.send(self.history.iter().take(limit).cloned().collect());
            }
            Command::Shutdown { reply } => return Some(reply),
        }
        None
    }

    fn place_bet(
        &mut self,
        player_id: PlayerId,
        usd_amount: f64,
        quote: &PriceQuote,
    ) -> Result<BetReceipt> {
        let round = self
            .current
            .as_mut()
            .ok_or_else(|| GameError::round_state("No round is accepting bets"))?;

        let receipt = self.settlement.place_bet(
            round,
            player_id,
            usd_amount,
            quote,
            self.config.betting_window,
        )?;

        self.events.publish(GameEvent::BetPlaced {
            round_number: receipt.round_number,
            player_id,
            asset: receipt.asset,
            stake: receipt.accepted_amount,
        });
        Ok(receipt)
    }

    /// Read the live multiplier at `now`, failing unless the round is live
    /// and that reading is still below the crash point. A round whose clock
    /// has reached the crash point is crashed here.
    fn ensure_settleable(&mut self, now: Instant) -> Result<f64> {
        let growth_rate = self.config.growth_rate;

        let (multiplier, crashed) = match &self.current {
            None => return Err(GameError::round_state("No round in progress")),
            Some(round) if round.status() != RoundStatus::Live => {
                return Err(GameError::round_state(format!(
                    "Round {} is {}",
                    round.round_number(),
                    round.status().as_str()
                )));
            }
            Some(round) => {
                let multiplier = round.multiplier_at(now, growth_rate);
                (multiplier, round.reaches_crash(multiplier))
            }
        };

        if crashed {
            let round_number = self.crash_current();
            return Err(GameError::round_state(format!(
                "Round {} has already crashed",
                round_number
            )));
        }
        Ok(multiplier)
    }

    fn open_bet_asset(&mut self, player_id: PlayerId) -> Result<Asset> {
        self.ensure_settleable(Instant::now())?;
        let round = self
            .current
            .as_ref()
            .ok_or_else(|| GameError::round_state("No round in progress"))?;
        let bet = round.bets().open_bet(player_id, round.round_number())?;
        Ok(bet.asset)
    }

    fn cash_out(&mut self, player_id: PlayerId, quote: &PriceQuote) -> Result<CashoutReceipt> {
        // One clock reading both validates and prices the cashout
        let multiplier = self.ensure_settleable(Instant::now())?;
        let round = self
            .current
            .as_mut()
            .ok_or_else(|| GameError::round_state("No round in progress"))?;
        round.advance(multiplier);

        let receipt = self
            .settlement
            .cash_out(round, player_id, multiplier, quote)?;

        self.events.publish(GameEvent::PlayerCashedOut {
            round_number: receipt.round_number,
            player_id,
            multiplier: receipt.multiplier,
            payout: receipt.payout,
        });
        Ok(receipt)
    }

    fn on_tick(&mut self) {
        let growth_rate = self.config.growth_rate;
        let Some(round) = self.current.as_mut() else {
            return;
        };
        if round.status() != RoundStatus::Live {
            return;
        }

        let multiplier = round.multiplier_at(Instant::now(), growth_rate);
        if round.reaches_crash(multiplier) {
            self.crash_current();
            return;
        }

        round.advance(multiplier);
        let round_number = round.round_number();
        self.events.publish(GameEvent::MultiplierTick {
            round_number,
            multiplier,
        });

        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % self.config.persist_every_ticks == 0 {
            self.settlement.persistence().submit(PersistOp::Multiplier {
                round_number,
                multiplier,
            });
        }
        tracing::debug!("Round {} at {:.2}x", round_number, multiplier);
    }

    async fn on_wake(&mut self) {
        let Some((_, wake)) = self.wake.take() else {
            return;
        };
        match wake {
            Wake::CreateRound => self.create_round().await,
            Wake::GoLive => self.go_live(),
        }
    }

    /// Persist and open the next round, retrying with backoff when the
    /// repository fails.
    async fn create_round(&mut self) {
        let (round, attempt) = match self.staged.take() {
            Some(staged) => staged,
            None => {
                let round_number = self.last_round_number + 1;
                let commitment = self.seeds.next_seed(round_number);
                (Round::new(round_number, commitment), 1)
            }
        };

        match self.repository.create_round(&round.to_record()).await {
            Ok(()) => self.start_round(round),
            Err(e) if attempt < self.config.round_create_max_attempts => {
                let backoff = self.config.creation_backoff(attempt);
                tracing::warn!(
                    "Failed to persist round {} (attempt {}), retrying in {:?}: {}",
                    round.round_number(),
                    attempt,
                    backoff,
                    e
                );
                self.staged = Some((round, attempt + 1));
                self.schedule(backoff, Wake::CreateRound);
            }
            Err(e) => {
                tracing::error!(
                    "Giving up persisting round {} after {} attempts, running it in memory only: {}",
                    round.round_number(),
                    attempt,
                    e
                );
                self.start_round(round);
            }
        }
    }

    fn start_round(&mut self, round: Round) {
        let round_number = round.round_number();
        self.last_round_number = round_number;

        self.events.publish(GameEvent::RoundStarted {
            round_number,
            commitment_hash: round.commitment_hash().to_string(),
            growth_rate: self.config.growth_rate,
            tick_interval: self.config.tick_interval,
        });
        tracing::info!(
            "Round {} started with commitment {}",
            round_number,
            round.commitment_hash()
        );
        self.current = Some(round);

        if self.config.betting_duration.is_zero() {
            self.go_live();
        } else {
            self.schedule(self.config.betting_duration, Wake::GoLive);
        }
    }

    fn go_live(&mut self) {
        let Some(round) = self.current.as_mut() else {
            return;
        };
        if round.status() != RoundStatus::Pending {
            return;
        }

        round.go_live(Instant::now());
        self.ticks = 0;
        let round_number = round.round_number();
        let instant_crash = round.reaches_crash(round.multiplier());

        self.settlement.persistence().submit(PersistOp::MarkLive {
            round_number,
            started_at: chrono::Utc::now(),
        });
        self.events.publish(GameEvent::RoundLive { round_number });
        tracing::info!("Round {} is live", round_number);

        if instant_crash {
            self.crash_current();
        }
    }

    /// Crash the current round: freeze the multiplier, sweep open bets,
    /// reveal the seed and schedule the next round.
    fn crash_current(&mut self) -> u64 {
        let Some(round) = self.current.as_mut() else {
            return self.last_round_number;
        };
        let round_number = round.round_number();
        if round.status() == RoundStatus::Crashed {
            return round_number;
        }

        round.crash();
        self.settlement.settle_losses(round);

        let seed = round.revealed_seed().unwrap_or_default().to_string();
        self.events.publish(GameEvent::Crashed {
            round_number,
            crash_point: round.crash_point(),
            seed,
        });
        self.settlement
            .persistence()
            .submit(PersistOp::FinishRound(round.to_record()));
        tracing::info!("Round {} crashed at {:.2}x", round_number, round.crash_point());

        if let Some(summary) = round.summary() {
            self.history.push_front(summary);
            self.history.truncate(self.config.history_size);
        }

        self.schedule(self.config.cooldown, Wake::CreateRound);
        round_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BettingWindow;
    use crate::error::ErrorKind;
    use crate::fairness::FixedSeedSource;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use crash_core::storage::round_store::{BetRecord, RoundRecord};
    use crash_core::{Amount, BetOutcome, FixedPriceOracle, Transaction};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Accepts every write, failing the first `create_failures` round inserts
    /// and, with `fail_multiplier`, every multiplier update.
    #[derive(Default)]
    struct MemoryRepository {
        create_failures: u32,
        create_calls: AtomicU32,
        fail_multiplier: bool,
        multiplier_calls: AtomicU32,
    }

    #[async_trait]
    impl RoundRepository for MemoryRepository {
        async fn latest_round_number(&self) -> crash_core::Result<Option<u64>> {
            Ok(None)
        }

        async fn create_round(&self, _round: &RoundRecord) -> crash_core::Result<()> {
            let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.create_failures {
                return Err(CoreError::internal("database is locked"));
            }
            Ok(())
        }

        async fn mark_live(&self, _: u64, _: DateTime<Utc>) -> crash_core::Result<()> {
            Ok(())
        }

        async fn update_multiplier(&self, _: u64, _: f64) -> crash_core::Result<()> {
            self.multiplier_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_multiplier {
                return Err(CoreError::internal("disk I/O error"));
            }
            Ok(())
        }

        async fn finish_round(&self, _: &RoundRecord) -> crash_core::Result<()> {
            Ok(())
        }

        async fn save_bet(&self, _: &BetRecord) -> crash_core::Result<()> {
            Ok(())
        }

        async fn append_transaction(&self, _: &Transaction) -> crash_core::Result<()> {
            Ok(())
        }

        async fn save_balance(&self, _: PlayerId, _: Asset, _: Amount) -> crash_core::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        handle: EngineHandle,
        events: broadcast::Receiver<GameEvent>,
        balances: Arc<BalanceStore>,
        repository: Arc<MemoryRepository>,
        oracle: Arc<FixedPriceOracle>,
        player: PlayerId,
    }

    async fn start(config: GameConfig, seeds: &[&str], create_failures: u32) -> Harness {
        let repository = MemoryRepository {
            create_failures,
            ..Default::default()
        };
        start_with(config, seeds, repository).await
    }

    async fn start_with(
        config: GameConfig,
        seeds: &[&str],
        repository: MemoryRepository,
    ) -> Harness {
        let balances = Arc::new(BalanceStore::new());
        let player = PlayerId::new();
        balances.register(player, [(Asset::Btc, Amount::from_units(1_000_000))]);

        let repository = Arc::new(repository);
        let oracle = Arc::new(FixedPriceOracle::new([(Asset::Btc, 50_000.0)]));
        let events = EventBus::new(config.event_capacity);
        let receiver = events.subscribe();

        let ctx = EngineContext::new(
            balances.clone(),
            Arc::new(TransactionLog::new()),
            oracle.clone(),
            repository.clone(),
        )
        .with_seeds(FixedSeedSource::exact(seeds.iter().copied()))
        .with_events(events);

        let handle = RoundEngine::spawn(config, ctx).await.unwrap();
        Harness {
            handle,
            events: receiver,
            balances,
            repository,
            oracle,
            player,
        }
    }

    async fn next_matching(
        events: &mut broadcast::Receiver<GameEvent>,
        pred: impl Fn(&GameEvent) -> bool,
    ) -> GameEvent {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event bus closed: {}", e),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_starts_pending_then_goes_live() {
        let mut h = start(GameConfig::default(), &["abc1237"], 0).await;

        let started = next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;
        match started {
            GameEvent::RoundStarted {
                round_number,
                commitment_hash,
                ..
            } => {
                assert_eq!(round_number, 1);
                assert_eq!(
                    commitment_hash,
                    "25cd86c40a708b1c278b69d07ced422abb3cc1c8cd2790d712f9302170d36908"
                );
            }
            other => panic!("unexpected event {:?}", other),
        }

        let state = h.handle.current_round().await.unwrap();
        assert_eq!(state.status, RoundStatus::Pending);
        assert_eq!(state.multiplier, 1.0);

        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundLive { .. })).await;
        assert_eq!(h.handle.current_round().await.unwrap().status, RoundStatus::Live);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bet_and_cash_out_at_two() {
        let mut h = start(GameConfig::default(), &["abc1237"], 0).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;

        let receipt = h.handle.place_bet(h.player, 100.0, Asset::Btc).await.unwrap();
        assert_eq!(receipt.accepted_amount, Amount::from_units(200_000));

        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundLive { .. })).await;
        tokio::time::advance(Duration::from_secs(100)).await;

        let cashout = h.handle.request_cashout(h.player).await.unwrap();
        assert_eq!(cashout.multiplier, 2.0);
        assert_eq!(cashout.payout, Amount::from_units(400_000));
        assert_eq!(cashout.usd_value, 200.0);
        assert_eq!(
            h.balances.balance(h.player, Asset::Btc).unwrap(),
            Amount::from_units(1_200_000)
        );

        let err = h.handle.request_cashout(h.player).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateSettlement);

        h.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_only_rejects_live_bets() {
        let mut h = start(GameConfig::default(), &["abc1237"], 0).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundLive { .. })).await;

        let err = h.handle.place_bet(h.player, 10.0, Asset::Btc).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RoundState);
        assert_eq!(
            h.balances.balance(h.player, Asset::Btc).unwrap(),
            Amount::from_units(1_000_000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_betting_window() {
        let config = GameConfig {
            betting_window: BettingWindow::PendingAndLive,
            betting_duration: Duration::ZERO,
            ..GameConfig::default()
        };
        let mut h = start(config, &["abc1237"], 0).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundLive { .. })).await;

        h.handle.place_bet(h.player, 10.0, Asset::Btc).await.unwrap();
        assert_eq!(h.handle.current_round().await.unwrap().bet_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_failure_has_no_side_effect() {
        let mut h = start(GameConfig::default(), &["abc1237"], 0).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;
        h.handle.place_bet(h.player, 100.0, Asset::Btc).await.unwrap();
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundLive { .. })).await;

        h.oracle.remove_price(Asset::Btc);
        let err = h.handle.request_cashout(h.player).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PriceUnavailable);
        assert_eq!(
            h.balances.balance(h.player, Asset::Btc).unwrap(),
            Amount::from_units(800_000)
        );

        h.oracle.set_price(Asset::Btc, 50_000.0);
        assert!(h.handle.request_cashout(h.player).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cashout_after_crash_point_is_rejected() {
        // seed-10 crashes at 1.50x
        let mut h = start(GameConfig::default(), &["seed-10"], 0).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;
        h.handle.place_bet(h.player, 100.0, Asset::Btc).await.unwrap();
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundLive { .. })).await;

        tokio::time::advance(Duration::from_secs(60)).await;

        let err = h.handle.request_cashout(h.player).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RoundState);

        let crashed = next_matching(&mut h.events, |e| matches!(e, GameEvent::Crashed { .. })).await;
        assert_eq!(
            crashed,
            GameEvent::Crashed {
                round_number: 1,
                crash_point: 1.5,
                seed: "seed-10".to_string(),
            }
        );

        let history = h.handle.round_history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].crash_point, 1.5);
        assert_eq!(history[0].bets[0].outcome, BetOutcome::Lost);
        assert_eq!(
            h.balances.balance(h.player, Asset::Btc).unwrap(),
            Amount::from_units(800_000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cashout_at_crash_point_between_ticks() {
        // No tick fires before the clock passes 1.50x, so only the cashout
        // reading can detect the crash.
        let config = GameConfig {
            tick_interval: Duration::from_secs(3600),
            ..GameConfig::default()
        };
        let mut h = start(config, &["seed-10"], 0).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;
        h.handle.place_bet(h.player, 100.0, Asset::Btc).await.unwrap();
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundLive { .. })).await;

        tokio::time::advance(Duration::from_millis(50_001)).await;

        let err = h.handle.request_cashout(h.player).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RoundState);

        let state = h.handle.current_round().await.unwrap();
        assert_eq!(state.status, RoundStatus::Crashed);
        assert_eq!(state.multiplier, 1.5);

        let history = h.handle.round_history(1).await.unwrap();
        assert_eq!(history[0].bets[0].outcome, BetOutcome::Lost);
        assert_eq!(
            h.balances.balance(h.player, Asset::Btc).unwrap(),
            Amount::from_units(800_000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_climb_until_crash_despite_failed_writes() {
        let config = GameConfig {
            persist_every_ticks: 5,
            ..GameConfig::default()
        };
        let growth_rate = config.growth_rate;
        let period = config.tick_interval.as_secs_f64();
        let repository = MemoryRepository {
            fail_multiplier: true,
            ..Default::default()
        };
        // seed-10 crashes at 1.50x
        let mut h = start_with(config, &["seed-10"], repository).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundLive { .. })).await;

        let mut ticks = Vec::new();
        loop {
            match next_matching(&mut h.events, |e| {
                matches!(e, GameEvent::MultiplierTick { .. } | GameEvent::Crashed { .. })
            })
            .await
            {
                GameEvent::MultiplierTick { multiplier, .. } => ticks.push(multiplier),
                GameEvent::Crashed { crash_point, .. } => {
                    assert_eq!(crash_point, 1.5);
                    break;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        assert!(ticks.len() >= 499, "only {} ticks", ticks.len());
        assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
        assert!(ticks.iter().all(|m| *m < 1.5));
        for (i, multiplier) in ticks.iter().enumerate() {
            let elapsed = (i + 1) as f64 * period;
            assert!((multiplier - (1.0 + elapsed * growth_rate)).abs() < 1e-9);
        }

        h.handle.shutdown().await.unwrap();
        assert_eq!(
            h.repository.multiplier_calls.load(Ordering::SeqCst) as usize,
            ticks.len() / 5
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_crash_at_one() {
        // seed-161 crashes at 1.00x
        let mut h = start(GameConfig::default(), &["seed-161"], 0).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;
        h.handle.place_bet(h.player, 50.0, Asset::Btc).await.unwrap();

        let crashed = next_matching(&mut h.events, |e| matches!(e, GameEvent::Crashed { .. })).await;
        assert_eq!(crashed.round_number(), 1);

        let history = h.handle.round_history(1).await.unwrap();
        assert_eq!(history[0].crash_point, 1.0);
        assert_eq!(history[0].bets[0].outcome, BetOutcome::Lost);
        assert!(history[0].bets[0].cashout_multiplier.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_round_after_cooldown() {
        let mut h = start(GameConfig::default(), &["seed-161", "abc1237"], 0).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::Crashed { .. })).await;

        let started = next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;
        assert_eq!(started.round_number(), 2);
        assert_eq!(h.handle.current_round().await.unwrap().round_number, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_creation_retries() {
        let mut h = start(GameConfig::default(), &["abc1237"], 2).await;

        let started = next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;
        assert_eq!(started.round_number(), 1);
        assert_eq!(h.repository.create_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_runs_in_memory_after_retries_exhausted() {
        let config = GameConfig {
            round_create_max_attempts: 2,
            ..GameConfig::default()
        };
        let mut h = start(config, &["abc1237"], u32::MAX).await;

        let started = next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;
        assert_eq!(started.round_number(), 1);
        assert_eq!(h.repository.create_calls.load(Ordering::SeqCst), 2);
        assert!(h.handle.place_bet(h.player, 10.0, Asset::Btc).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cashouts_settle_once() {
        let mut h = start(GameConfig::default(), &["abc1237"], 0).await;
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundStarted { .. })).await;
        h.handle.place_bet(h.player, 100.0, Asset::Btc).await.unwrap();
        next_matching(&mut h.events, |e| matches!(e, GameEvent::RoundLive { .. })).await;
        tokio::time::advance(Duration::from_secs(50)).await;

        let (first, second) = tokio::join!(
            h.handle.request_cashout(h.player),
            h.handle.request_cashout(h.player)
        );
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == ErrorKind::DuplicateSettlement));
        assert_eq!(
            h.balances.balance(h.player, Asset::Btc).unwrap(),
            Amount::from_units(1_100_000)
        );
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_engine() {
        let h = start(GameConfig::default(), &[], 0).await;
        h.handle.shutdown().await.unwrap();

        let err = h.handle.current_round().await.unwrap_err();
        assert!(matches!(err, GameError::EngineStopped));
    }
}
