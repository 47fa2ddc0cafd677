//! Payment provider seam
//!
//! The billing run talks to the payment provider through this trait so tests
//! can substitute a fake. The production implementation drives Stripe with the
//! invoice-item → invoice → finalize flow (JPY is zero-decimal, so amounts are
//! whole yen).

use async_trait::async_trait;
use stripe::{CreateInvoice, CreateInvoiceItem, CustomerId, Invoice, InvoiceId, InvoiceItem};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Result of a successful charge
#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub invoice_id: String,
    pub invoice_item_id: String,
    /// Payment intent attached by finalization, if Stripe created one
    pub payment_intent_id: Option<String>,
    /// Payment page URL, present when the invoice was finalized with one
    pub hosted_invoice_url: Option<String>,
}

/// Customer-scoped charge execution
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Charge `amount_yen` to the stored customer. Must not be called with a
    /// non-positive amount; callers validate first.
    async fn charge(
        &self,
        customer_ref: &str,
        amount_yen: i64,
        description: &str,
    ) -> BillingResult<ChargeOutcome>;
}

/// Stripe-backed payment provider
#[derive(Clone)]
pub struct StripeProvider {
    stripe: StripeClient,
}

impl StripeProvider {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn charge(
        &self,
        customer_ref: &str,
        amount_yen: i64,
        description: &str,
    ) -> BillingResult<ChargeOutcome> {
        if amount_yen <= 0 {
            return Err(BillingError::InvalidAmount(amount_yen));
        }

        let customer_id = customer_ref
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        // Create invoice item
        let mut item_params = CreateInvoiceItem::new(customer_id.clone());
        item_params.amount = Some(amount_yen);
        item_params.currency = Some(stripe::Currency::JPY);
        item_params.description = Some(description);

        let invoice_item = InvoiceItem::create(self.stripe.inner(), item_params).await?;

        // Create invoice with auto-advance for immediate payment
        let mut invoice_params = CreateInvoice::new();
        invoice_params.customer = Some(customer_id);
        invoice_params.auto_advance = Some(true);
        invoice_params.collection_method = Some(stripe::CollectionMethod::ChargeAutomatically);
        invoice_params.description = Some(description);

        let invoice = Invoice::create(self.stripe.inner(), invoice_params).await?;

        // Finalize the invoice to trigger the payment attempt
        let invoice_id_parsed = invoice
            .id
            .as_str()
            .parse::<InvoiceId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid invoice ID: {}", e)))?;

        let finalized =
            Invoice::finalize(self.stripe.inner(), &invoice_id_parsed, Default::default()).await?;

        let payment_intent_id = finalized.payment_intent.as_ref().map(|pi| match pi {
            stripe::Expandable::Id(id) => id.to_string(),
            stripe::Expandable::Object(obj) => obj.id.to_string(),
        });

        tracing::info!(
            invoice_id = %invoice.id,
            invoice_item_id = %invoice_item.id,
            amount_yen = amount_yen,
            "Charge processed via Stripe"
        );

        Ok(ChargeOutcome {
            invoice_id: invoice.id.to_string(),
            invoice_item_id: invoice_item.id.to_string(),
            payment_intent_id,
            hosted_invoice_url: finalized.hosted_invoice_url,
        })
    }
}
