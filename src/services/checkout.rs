//! Checkout orchestration: validate the purchase, compute totals, persist the
//! pending order, and hand it to the rail's payment strategy. The order is
//! durably visible before any processor is contacted so that an early webhook
//! can always find it.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    commission,
    errors::ServiceError,
    events::{Event, EventSender},
    models::catalog::Product,
    models::order::{
        DigitalDeliveryStatus, FulfillmentStatus, Money, Order, OrderItem, OrderKind, PaymentRail,
        PaymentStatus, RailState, ShippingMethod,
    },
    payments::{CheckoutOutcome, PaymentStrategy},
    store::Stores,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub buyer_id: Uuid,
    pub lines: Vec<CheckoutLine>,
    pub rail: PaymentRail,
    pub shipping_address_id: Option<Uuid>,
    pub shipping_method: Option<ShippingMethod>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i64,
}

/// One strategy per rail, all behind the same interface.
#[derive(Clone)]
pub struct PaymentStrategies {
    pub internal: Arc<dyn PaymentStrategy>,
    pub card: Arc<dyn PaymentStrategy>,
    pub wallet: Arc<dyn PaymentStrategy>,
}

impl PaymentStrategies {
    fn for_rail(&self, rail: PaymentRail) -> &Arc<dyn PaymentStrategy> {
        match rail {
            PaymentRail::Points => &self.internal,
            PaymentRail::Card => &self.card,
            PaymentRail::Wallet => &self.wallet,
        }
    }
}

pub struct CheckoutService {
    stores: Stores,
    strategies: PaymentStrategies,
    events: EventSender,
}

impl CheckoutService {
    pub fn new(stores: Stores, strategies: PaymentStrategies, events: EventSender) -> Self {
        Self {
            stores,
            strategies,
            events,
        }
    }

    #[instrument(skip(self, request), fields(buyer_id = %request.buyer_id, rail = %request.rail))]
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "at least one line is required".to_string(),
            ));
        }
        for line in &request.lines {
            line.validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        }

        let now = Utc::now();
        let currency = request.rail.currency();

        // Resolve and vet every line before anything is written.
        let mut resolved: Vec<(&CheckoutLine, Product)> =
            Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = self
                .stores
                .inventory
                .get_product(line.product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::ListingUnavailable(format!(
                        "product {} does not exist",
                        line.product_id
                    ))
                })?;

            if !product.is_purchasable(now) {
                return Err(ServiceError::ListingUnavailable(product.name));
            }

            let level = product.level(line.variant_id).ok_or_else(|| {
                ServiceError::ListingUnavailable(format!(
                    "variant {} does not exist",
                    line.variant_id.unwrap_or_default()
                ))
            })?;
            if !level.has(line.quantity) {
                return Err(ServiceError::OutOfStock(product.name));
            }

            resolved.push((line, product));
        }

        // Marketplace listings are purchased one at a time: a single seller
        // per order keeps the commission fields unambiguous.
        let seller_id = resolved
            .iter()
            .find_map(|(_, product)| product.seller_id);
        if seller_id.is_some() && resolved.len() > 1 {
            return Err(ServiceError::ValidationError(
                "marketplace listings must be purchased individually".to_string(),
            ));
        }
        if seller_id == Some(request.buyer_id) {
            return Err(ServiceError::SelfPurchase);
        }

        let mut items = Vec::with_capacity(resolved.len());
        for (line, product) in &resolved {
            let unit_price = product.price_for(currency).ok_or_else(|| {
                ServiceError::PaymentMethodNotAccepted(format!(
                    "{} does not accept {}",
                    product.name, currency
                ))
            })?;
            items.push(OrderItem {
                product_id: product.id,
                variant_id: line.variant_id,
                name: product.name.clone(),
                quantity: line.quantity,
                unit_price,
                currency,
                is_digital: product.is_digital,
            });
        }

        let digital_only = items.iter().all(|i| i.is_digital);
        let has_digital = items.iter().any(|i| i.is_digital);

        // Physical items ship somewhere; the address must exist and belong to
        // the buyer. Digital-only orders skip shipping entirely.
        let shipping_address_id = if digital_only {
            None
        } else {
            let address_id = request
                .shipping_address_id
                .ok_or(ServiceError::ShippingAddressRequired)?;
            let address = self
                .stores
                .addresses
                .get(address_id)
                .await?
                .ok_or(ServiceError::ShippingAddressRequired)?;
            if address.user_id != request.buyer_id {
                return Err(ServiceError::ShippingAddressRequired);
            }
            Some(address_id)
        };

        let subtotal: Money = items.iter().map(|i| i.unit_price * i.quantity).sum();
        let shipping_method = if digital_only {
            None
        } else {
            Some(request.shipping_method.unwrap_or(ShippingMethod::Standard))
        };
        let shipping = match (request.rail, shipping_method) {
            // The internal-currency rail ships free, as do digital-only orders.
            (PaymentRail::Points, _) | (_, None) => 0,
            (_, Some(method)) => method.cost(),
        };
        let tax: Money = 0;
        let total = subtotal + shipping + tax;

        let kind = match seller_id {
            Some(seller_id) => OrderKind::Marketplace {
                seller_id,
                commission: commission::calculate(subtotal, currency),
            },
            None => OrderKind::Shop,
        };

        let rail_state = match request.rail {
            PaymentRail::Points => RailState::InternalLedger,
            PaymentRail::Card => RailState::Card { intent_ref: None },
            PaymentRail::Wallet => RailState::Wallet {
                order_ref: None,
                capture_ref: None,
            },
        };

        let order_id = Uuid::new_v4();
        let order = Order {
            id: order_id,
            order_number: format!("DH-{}", order_id.to_string()[..8].to_uppercase()),
            buyer_id: request.buyer_id,
            kind,
            rail: rail_state,
            items,
            currency,
            subtotal,
            shipping,
            tax,
            total,
            payment_status: PaymentStatus::Pending,
            fulfillment_status: FulfillmentStatus::Unfulfilled,
            digital_delivery: has_digital.then_some(DigitalDeliveryStatus::Pending),
            shipping_address_id,
            shipping_method,
            created_at: now,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
        };

        // Durable before any outbound processor call.
        self.stores.orders.insert(order.clone()).await?;
        info!(order_id = %order.id, total = order.total, "order created");
        self.events
            .send(Event::OrderCreated {
                order_id: order.id,
                buyer_id: order.buyer_id,
                rail: request.rail,
            })
            .await;

        self.strategies.for_rail(request.rail).execute(order).await
    }
}
