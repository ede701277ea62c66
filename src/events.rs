// 10.0: every state change produces an event. used for audit trails, state
// reconstruction, and notifying external systems. the EventPayload enum lists
// all event types; the AMM and the vault each own a collector.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{AccountId, Direction, ExchangeId, Timestamp, Tranche};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // AMM events
    SwapInput(SwapInputEvent),
    SwapOutput(SwapOutputEvent),
    ReserveSnapshotted(ReserveSnapshottedEvent),
    MoveAmmPrice(MoveAmmPriceEvent),
    FundingSettled(FundingSettledEvent),
    CapChanged(CapChangedEvent),
    Shutdown(ShutdownEvent),

    // vault events
    LiquidityAdd(LiquidityAddEvent),
    LiquidityRemove(LiquidityRemoveEvent),
    BadDebtResolved(BadDebtResolvedEvent),
    CachedLiquidityAdded(CachedLiquidityAddedEvent),
    VaultWithdraw(VaultWithdrawEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapInputEvent {
    pub dir: Direction,
    pub quote_asset_amount: Decimal,
    pub base_asset_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapOutputEvent {
    pub dir: Direction,
    pub quote_asset_amount: Decimal,
    pub base_asset_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveSnapshottedEvent {
    pub quote_asset_reserve: Decimal,
    pub base_asset_reserve: Decimal,
}

// emitted on every convergence attempt, whether or not the move was applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveAmmPriceEvent {
    pub amm_price: Decimal,
    pub oracle_price: Decimal,
    pub adjust_price: Decimal,
    pub mm_liquidity: Decimal,
    pub mm_pnl: Decimal,
    pub moved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingSettledEvent {
    pub funding_rate: Decimal,
    pub underlying_price: Decimal,
    pub next_funding_time: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapChangedEvent {
    pub max_holding_base_asset: Decimal,
    pub open_interest_notional_cap: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownEvent {
    pub settlement_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityAddEvent {
    pub exchange: ExchangeId,
    pub account: AccountId,
    pub risk: Tranche,
    pub lp_fund: Decimal,
    pub token_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityRemoveEvent {
    pub exchange: ExchangeId,
    pub account: AccountId,
    pub risk: Tranche,
    pub lp_fund: Decimal,
    pub token_amount: Decimal,
}

// the four components always sum exactly to bad_debt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadDebtResolvedEvent {
    pub exchange: ExchangeId,
    pub bad_debt: Decimal,
    pub insurance_fund_resolve_bad_debt: Decimal,
    pub mm_high_resolve_bad_debt: Decimal,
    pub mm_low_resolve_bad_debt: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedLiquidityAddedEvent {
    pub exchange: ExchangeId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultWithdrawEvent {
    pub exchange: ExchangeId,
    pub to: AccountId,
    pub amount: Decimal,
}

pub trait EventEmitter {
    fn emit(&mut self, event: Event);
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventCollector {
    events: Vec<Event>,
    next_id: u64,
}

impl EventCollector {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    // stamp, number and store a payload in one step
    pub fn record(&mut self, timestamp: Timestamp, payload: EventPayload) {
        let event = Event {
            id: EventId(self.next_id),
            timestamp,
            payload,
        };
        self.next_id += 1;
        self.events.push(event);
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}
