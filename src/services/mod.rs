pub mod checkout;
pub mod coin_packs;
pub mod orders;
pub mod settlement;
pub mod webhooks;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    events::EventSender,
    payments::{
        card::{CardIntentStrategy, CardProcessor},
        internal::InternalLedgerStrategy,
        wallet::{RedirectWalletStrategy, WalletProcessor},
    },
    store::Stores,
};

/// Aggregated services used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<checkout::CheckoutService>,
    pub settlement: Arc<settlement::SettlementService>,
    pub webhooks: Arc<webhooks::WebhookService>,
    pub coin_packs: Arc<coin_packs::CoinPackService>,
    pub orders: Arc<orders::OrderCommandService>,
}

impl AppServices {
    pub fn new(
        config: &AppConfig,
        stores: Stores,
        card: Arc<dyn CardProcessor>,
        wallet: Arc<dyn WalletProcessor>,
        events: EventSender,
    ) -> Self {
        let settlement = Arc::new(settlement::SettlementService::new(
            stores.clone(),
            events.clone(),
        ));

        let strategies = checkout::PaymentStrategies {
            internal: Arc::new(InternalLedgerStrategy::new(
                stores.orders.clone(),
                stores.inventory.clone(),
                stores.points.clone(),
                events.clone(),
            )),
            card: Arc::new(CardIntentStrategy::new(
                card.clone(),
                stores.orders.clone(),
            )),
            wallet: Arc::new(RedirectWalletStrategy::new(
                wallet.clone(),
                stores.orders.clone(),
                &config.wallet,
            )),
        };

        let checkout = Arc::new(checkout::CheckoutService::new(
            stores.clone(),
            strategies,
            events.clone(),
        ));

        let webhooks = Arc::new(webhooks::WebhookService::new(
            stores.clone(),
            settlement.clone(),
            wallet.clone(),
            events.clone(),
            config.card.webhook_secret.clone(),
            config.card.webhook_tolerance_secs,
        ));

        let coin_packs = Arc::new(coin_packs::CoinPackService::new(
            card.clone(),
            stores.coin_purchases.clone(),
        ));

        let orders = Arc::new(orders::OrderCommandService::new(
            stores,
            settlement.clone(),
            card,
            wallet,
        ));

        Self {
            checkout,
            settlement,
            webhooks,
            coin_packs,
            orders,
        }
    }
}
