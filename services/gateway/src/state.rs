//! Shared application state

use crate::auth::JwtAuthResolver;
use crate::kyc::KycPolicy;
use crate::rate_limit::RateLimiter;
use crate::runtime::EngineHandle;
use dashmap::DashMap;
use ledger::{Ledger, WalletAdapter};
use market_data::SubscriptionBus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use types::ids::{AccountId, OrderId};
use types::market::{Symbol, SymbolConfig};

/// Where an order lives and who owns it, kept so cancels and queries can
/// be routed and authorized without touching any book.
#[derive(Debug, Clone)]
pub struct OrderRoute {
    pub symbol: Symbol,
    pub account_id: AccountId,
}

pub struct AppInner {
    pub ledger: Arc<Ledger>,
    pub wallet: WalletAdapter,
    pub bus: Arc<SubscriptionBus>,
    pub engines: HashMap<Symbol, EngineHandle>,
    pub symbols: HashMap<Symbol, SymbolConfig>,
    /// order_id → routing info (symbol task + owner)
    pub order_router: DashMap<OrderId, OrderRoute>,
    /// (owner, client_order_id) → order_id, for duplicate detection
    pub client_orders: DashMap<(AccountId, String), OrderId>,
    next_order_id: AtomicU64,
    pub rate_limiter: RateLimiter,
    pub auth: JwtAuthResolver,
    pub kyc: Arc<dyn KycPolicy>,
}

/// Cloneable handle used as the axum state.
#[derive(Clone)]
pub struct AppState(Arc<AppInner>);

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<Ledger>,
        bus: Arc<SubscriptionBus>,
        engines: HashMap<Symbol, EngineHandle>,
        symbols: HashMap<Symbol, SymbolConfig>,
        auth: JwtAuthResolver,
        kyc: Arc<dyn KycPolicy>,
        rate_limiter: RateLimiter,
        next_order_id: u64,
    ) -> Self {
        let wallet = WalletAdapter::new(ledger.clone());
        Self(Arc::new(AppInner {
            ledger,
            wallet,
            bus,
            engines,
            symbols,
            order_router: DashMap::new(),
            client_orders: DashMap::new(),
            next_order_id: AtomicU64::new(next_order_id),
            rate_limiter,
            auth,
            kyc,
        }))
    }

    /// Allocate the next process-wide order id.
    pub fn next_order_id(&self) -> OrderId {
        OrderId::new(self.0.next_order_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::ops::Deref for AppState {
    type Target = AppInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
