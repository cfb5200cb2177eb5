use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{LedgerEntry, Namespace, Payer};
use crate::gateway::{ChargeRequest, GatewayUnavailable, PaymentGateway};
use crate::ports::{LedgerRepository, OrderRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("No unpaid orders to pay for")]
    NoUnpaidOrders,

    #[error(transparent)]
    Gateway(#[from] GatewayUnavailable),

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// What the customer needs to complete payment on the gateway's page.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
    pub amount: BigDecimal,
}

/// Opens a charge for every unpaid order a customer holds in one subsystem.
#[derive(Clone)]
pub struct CheckoutService {
    namespace: Namespace,
    orders: Arc<dyn OrderRepository>,
    ledger: Arc<dyn LedgerRepository>,
    gateway: Arc<dyn PaymentGateway>,
    callback_url: String,
}

impl CheckoutService {
    pub fn new(
        namespace: Namespace,
        orders: Arc<dyn OrderRepository>,
        ledger: Arc<dyn LedgerRepository>,
        gateway: Arc<dyn PaymentGateway>,
        callback_url: String,
    ) -> Self {
        Self {
            namespace,
            orders,
            ledger,
            gateway,
            callback_url,
        }
    }

    /// The ledger entry is written only once the gateway accepted the charge,
    /// so a gateway failure leaves nothing behind.
    pub async fn initiate(&self, payer: &Payer) -> Result<CheckoutSession, CheckoutError> {
        let orders = self
            .orders
            .unpaid_orders(self.namespace, payer.customer_id)
            .await?;
        if orders.is_empty() {
            return Err(CheckoutError::NoUnpaidOrders);
        }

        let amount = orders
            .iter()
            .map(|o| o.total.clone())
            .fold(BigDecimal::from(0), |acc, x| acc + x);
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let reference = self.namespace.new_reference();
        let metadata = json!({
            "customer_name": payer.name,
            "customer_email": payer.email,
            "order_ids": order_ids,
        });

        let authorization = self
            .gateway
            .initialize_charge(&ChargeRequest {
                amount: amount.clone(),
                email: payer.email.clone(),
                reference: reference.clone(),
                callback_url: self.callback_url.clone(),
                metadata: metadata.clone(),
            })
            .await?;

        let entry = LedgerEntry::new(
            self.namespace,
            reference,
            amount,
            payer.email.clone(),
            order_ids,
            metadata,
        );
        let entry = self.ledger.insert(&entry).await?;

        tracing::info!(
            reference = %entry.reference,
            namespace = %self.namespace,
            amount = %entry.amount,
            orders = entry.order_ids.len(),
            "Payment initiated"
        );

        Ok(CheckoutSession {
            authorization_url: authorization.authorization_url,
            access_code: authorization.access_code,
            reference: entry.reference,
            amount: entry.amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::{LedgerStatus, Order};
    use crate::gateway::{ChargeAuthorization, ChargeStatus};
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::Mutex;

    struct StubGateway {
        fail: bool,
        requests: Mutex<Vec<ChargeRequest>>,
    }

    impl StubGateway {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn initialize_charge(
            &self,
            request: &ChargeRequest,
        ) -> Result<ChargeAuthorization, GatewayUnavailable> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(GatewayUnavailable("connection refused".to_string()));
            }
            Ok(ChargeAuthorization {
                authorization_url: "https://checkout.paystack.com/abc".to_string(),
                access_code: "abc".to_string(),
            })
        }

        async fn query_charge(&self, _reference: &str) -> Result<ChargeStatus, GatewayUnavailable> {
            Err(GatewayUnavailable("not used".to_string()))
        }
    }

    fn payer() -> Payer {
        Payer {
            customer_id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            name: Some("Ada".to_string()),
        }
    }

    fn service(store: &Arc<InMemoryStore>, gateway: Arc<StubGateway>) -> CheckoutService {
        CheckoutService::new(
            Namespace::Clothing,
            store.clone(),
            store.clone(),
            gateway,
            "https://shop.example.com/callback".to_string(),
        )
    }

    #[tokio::test]
    async fn test_initiate_sums_unpaid_orders() {
        let store = Arc::new(InMemoryStore::new());
        let payer = payer();
        for total in ["3000.00", "2000.00"] {
            let order = Order::new(
                Namespace::Clothing,
                payer.customer_id,
                BigDecimal::from_str(total).unwrap(),
            );
            store.insert_order(&order).await.unwrap();
        }
        let gateway = Arc::new(StubGateway::new(false));

        let session = service(&store, gateway.clone()).initiate(&payer).await.unwrap();

        assert!(session.reference.starts_with("CLOTH-"));
        assert_eq!(session.amount, BigDecimal::from_str("5000.00").unwrap());

        let entry = store
            .find_by_reference(&session.reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, LedgerStatus::Pending);
        assert_eq!(entry.order_ids.len(), 2);
        assert_eq!(entry.metadata["customer_email"], "a@b.com");

        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests[0].reference, session.reference);
    }

    #[tokio::test]
    async fn test_no_unpaid_orders() {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(StubGateway::new(false));

        let err = service(&store, gateway.clone())
            .initiate(&payer())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::NoUnpaidOrders));
        assert!(gateway.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let payer = payer();
        let order = Order::new(Namespace::Clothing, payer.customer_id, BigDecimal::from(100));
        store.insert_order(&order).await.unwrap();
        let gateway = Arc::new(StubGateway::new(true));

        let err = service(&store, gateway.clone()).initiate(&payer).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Gateway(_)));

        let reference = gateway.requests.lock().unwrap()[0].reference.clone();
        assert!(store.find_by_reference(&reference).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_orders_of_other_namespace_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let payer = payer();
        let order = Order::new(Namespace::Bulk, payer.customer_id, BigDecimal::from(100));
        store.insert_order(&order).await.unwrap();

        let err = service(&store, Arc::new(StubGateway::new(false)))
            .initiate(&payer)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NoUnpaidOrders));
    }
}
