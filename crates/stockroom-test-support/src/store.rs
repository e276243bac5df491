//! In-memory `ProductStore` for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use stockroom_core::error::DomainError;
use stockroom_core::model::{
    NewProduct, Product, ProductFilter, Purchase, PurchaseOrder, Transaction,
};
use stockroom_core::store::ProductStore;

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<i64, Product>,
    transactions: Vec<Transaction>,
    next_product_id: i64,
    next_transaction_id: i64,
}

/// A product store backed by ordered maps.
///
/// Every operation takes one lock, so `purchase` is atomic the same way the
/// conditional `UPDATE` is in `PostgreSQL`. Reads can be switched to fail to
/// exercise the circuit breaker, and read calls are counted so tests can
/// prove a call never reached the store.
#[derive(Debug)]
pub struct InMemoryProductStore {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
    created_at: DateTime<Utc>,
}

impl InMemoryProductStore {
    /// Creates an empty store.
    ///
    /// # Panics
    ///
    /// Never in practice; the fixed timestamp is a valid date.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_product_id: 1,
                next_transaction_id: 1,
                ..Tables::default()
            }),
            fail_reads: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    /// Creates a store seeded with `products`, keeping their ids.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_products(products: Vec<Product>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.lock().unwrap();
            for product in products {
                tables.next_product_id = tables.next_product_id.max(product.id + 1);
                tables.products.insert(product.id, product);
            }
        }
        store
    }

    /// Makes `list` and `find` fail with a transient error while `true`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `list`/`find` calls that reached the store.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Returns the current state of a product, bypassing counters.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn product(&self, id: i64) -> Option<Product> {
        self.tables.lock().unwrap().products.get(&id).cloned()
    }

    /// Returns every recorded transaction.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.tables.lock().unwrap().transactions.clone()
    }

    fn record_read(&self) -> Result<(), DomainError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DomainError::Transient("connection refused".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryProductStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, DomainError> {
        self.record_read()?;
        let needle = filter.search().to_lowercase();
        let tables = self.tables.lock().unwrap();
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        Ok(tables
            .products
            .values()
            .filter(|p| needle.is_empty() || p.name.to_lowercase().contains(&needle))
            .skip(offset)
            .take(filter.limit() as usize)
            .cloned()
            .collect())
    }

    async fn find(&self, id: i64) -> Result<Option<Product>, DomainError> {
        self.record_read()?;
        Ok(self.tables.lock().unwrap().products.get(&id).cloned())
    }

    async fn insert(&self, product: &NewProduct) -> Result<Product, DomainError> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_product_id;
        tables.next_product_id += 1;
        let product = product.clone().with_id(id);
        tables.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update(&self, product: &Product) -> Result<bool, DomainError> {
        let mut tables = self.tables.lock().unwrap();
        match tables.products.get_mut(&product.id) {
            Some(existing) => {
                *existing = product.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, DomainError> {
        Ok(self.tables.lock().unwrap().products.remove(&id).is_some())
    }

    async fn purchase(&self, order: &PurchaseOrder) -> Result<Purchase, DomainError> {
        let mut tables = self.tables.lock().unwrap();
        let product = match tables.products.get_mut(&order.product_id) {
            Some(product) if product.stock >= order.quantity => {
                product.stock -= order.quantity;
                product.clone()
            }
            _ => {
                return Err(DomainError::InsufficientStockOrNotFound {
                    product_id: order.product_id,
                });
            }
        };
        let transaction = Transaction {
            id: tables.next_transaction_id,
            user_id: order.user_id,
            product_id: order.product_id,
            quantity: order.quantity,
            total_price: product.price * order.quantity,
            created_at: self.created_at,
        };
        tables.next_transaction_id += 1;
        tables.transactions.push(transaction.clone());
        Ok(Purchase {
            transaction,
            product,
        })
    }
}
