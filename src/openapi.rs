use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{errors, handlers, models, payments, services};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "DieHard Community API",
        description = "Orders, inventory, point ledger, and payment settlement"
    ),
    paths(
        handlers::health::health,
        handlers::checkout::checkout,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::capture_order,
        handlers::orders::cancel_payment,
        handlers::orders::refund_order,
        handlers::orders::ship_order,
        handlers::orders::deliver_order,
        handlers::webhooks::card_webhook,
        handlers::webhooks::wallet_webhook,
        handlers::coin_packs::list_coin_packs,
        handlers::coin_packs::purchase_coin_pack,
    ),
    components(schemas(
        errors::ErrorResponse,
        handlers::checkout::CheckoutResponse,
        handlers::orders::OrderResponse,
        handlers::orders::CommissionView,
        handlers::orders::RefundRequest,
        handlers::orders::RefundResponse,
        handlers::coin_packs::CoinPackPurchaseRequest,
        services::checkout::CheckoutRequest,
        services::checkout::CheckoutLine,
        services::coin_packs::CoinPurchaseInitiated,
        payments::PaymentContinuation,
        models::coin_pack::CoinPack,
        models::order::Currency,
        models::order::PaymentRail,
        models::order::PaymentStatus,
        models::order::FulfillmentStatus,
        models::order::DigitalDeliveryStatus,
        models::order::ShippingMethod,
        models::order::OrderItem,
    )),
    tags(
        (name = "Checkout", description = "Order creation and payment dispatch"),
        (name = "Orders", description = "Order lookups and payment commands"),
        (name = "Webhooks", description = "Payment processor event intake"),
        (name = "CoinPacks", description = "DieHard Dollar bundles"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
