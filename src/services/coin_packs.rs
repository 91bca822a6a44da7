//! Coin packs: fixed bundles of DieHard Dollars bought for USD through the
//! card rail. The purchase record is durable before the processor is
//! contacted; crediting happens in the webhook reconciler.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::coin_pack::{coin_pack_catalog, CoinPack, CoinPurchase, CoinPurchaseStatus},
    models::order::Currency,
    payments::card::CardProcessor,
    store::CoinPurchaseStore,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct CoinPurchaseInitiated {
    pub purchase_id: Uuid,
    pub intent_ref: String,
    pub client_secret: String,
}

pub struct CoinPackService {
    catalog: Vec<CoinPack>,
    card: Arc<dyn CardProcessor>,
    purchases: Arc<dyn CoinPurchaseStore>,
}

impl CoinPackService {
    pub fn new(card: Arc<dyn CardProcessor>, purchases: Arc<dyn CoinPurchaseStore>) -> Self {
        Self {
            catalog: coin_pack_catalog(),
            card,
            purchases,
        }
    }

    pub fn list(&self) -> &[CoinPack] {
        &self.catalog
    }

    #[instrument(skip(self), fields(user_id = %user_id, pack_id = %pack_id))]
    pub async fn purchase(
        &self,
        user_id: Uuid,
        pack_id: &str,
    ) -> Result<CoinPurchaseInitiated, ServiceError> {
        let pack = self
            .catalog
            .iter()
            .find(|p| p.id == pack_id)
            .ok_or_else(|| ServiceError::NotFound(format!("coin pack {} not found", pack_id)))?;

        let purchase = CoinPurchase {
            id: Uuid::new_v4(),
            user_id,
            pack_id: pack.id.clone(),
            coins: pack.coins,
            amount_usd: pack.price_usd,
            intent_ref: None,
            status: CoinPurchaseStatus::Pending,
            created_at: Utc::now(),
            credited_at: None,
        };
        let purchase_id = purchase.id;

        // Durable before the outbound call so the webhook can always resolve
        // the purchase through the intent metadata.
        self.purchases.insert(purchase).await?;

        let metadata = std::collections::HashMap::from([
            ("coin_purchase_id".to_string(), purchase_id.to_string()),
            ("coin_pack_id".to_string(), pack.id.clone()),
            ("user_id".to_string(), user_id.to_string()),
        ]);
        let intent = self
            .card
            .create_payment_intent(pack.price_usd, Currency::Usd, metadata)
            .await?;

        self.purchases
            .set_intent_ref(purchase_id, &intent.id)
            .await?;
        info!(purchase_id = %purchase_id, intent_ref = %intent.id, "coin purchase initiated");

        Ok(CoinPurchaseInitiated {
            purchase_id,
            intent_ref: intent.id,
            client_secret: intent.client_secret,
        })
    }
}
