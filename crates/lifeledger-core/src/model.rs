//! Ledger entity types
//!
//! The four money-bearing collections of a user's ledger, plus the
//! kind-generic plumbing (`EntityKind`, `LedgerRecord`, `SyncIntent`)
//! shared by the cache, merge, and sync layers. All entities serialize
//! with camelCase field names; dates serialize as ISO-8601 strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Generate a new locally-unique entity id
///
/// Ids are minted on-device so creation succeeds while offline; both the
/// cache and the remote store key by id, so replays never duplicate.
pub fn new_entity_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ==================== Flow Kind ====================

/// Direction of a money flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    /// Money entering a payment method
    Income,
    /// Money leaving a payment method
    Expense,
}

impl std::str::FromStr for FlowKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(FlowKind::Income),
            "expense" => Ok(FlowKind::Expense),
            _ => Err(format!("Invalid flow kind: {}", s)),
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowKind::Income => write!(f, "income"),
            FlowKind::Expense => write!(f, "expense"),
        }
    }
}

// ==================== Entity Kind ====================

/// The four entity collections of a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    PaymentMethod,
    Category,
    Transaction,
    DebtLoan,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::PaymentMethod,
        EntityKind::Category,
        EntityKind::Transaction,
        EntityKind::DebtLoan,
    ];

    /// Collection name used as the cache key, the remote sub-collection
    /// name, and the backup document field
    pub fn collection_name(&self) -> &'static str {
        match self {
            EntityKind::PaymentMethod => "paymentMethods",
            EntityKind::Category => "categories",
            EntityKind::Transaction => "transactions",
            EntityKind::DebtLoan => "debtLoans",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.collection_name())
    }
}

// ==================== Entities ====================

/// A payment method (cash, bank card, wallet, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    /// Stable unique id
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    /// Opening balance, set once at creation
    pub initial_balance: Decimal,
    /// Derived running balance; always `initial_balance` plus the net
    /// effect of every transaction referencing this method
    pub current_balance: Decimal,
    /// Description keywords used by external matching heuristics
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Last-modified timestamp for conflict resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PaymentMethod {
    /// Create a method whose running balance starts at its opening balance
    pub fn new(name: &str, initial_balance: Decimal) -> Self {
        Self {
            id: new_entity_id(),
            name: name.to_string(),
            icon: String::new(),
            color: String::new(),
            initial_balance,
            current_balance: initial_balance,
            keywords: Vec::new(),
            updated_at: Some(Utc::now()),
        }
    }

    /// The fixed default set seeded into an empty remote namespace
    ///
    /// Ids are constant so retried seeding collapses into the same records.
    pub fn seed_defaults() -> Vec<PaymentMethod> {
        let defaults = [
            ("pm-cash", "Cash", "banknote", "#4caf50"),
            ("pm-card", "Bank Card", "credit-card", "#2196f3"),
        ];
        defaults
            .iter()
            .map(|(id, name, icon, color)| PaymentMethod {
                id: id.to_string(),
                name: name.to_string(),
                icon: icon.to_string(),
                color: color.to_string(),
                initial_balance: Decimal::ZERO,
                current_balance: Decimal::ZERO,
                keywords: Vec::new(),
                updated_at: None,
            })
            .collect()
    }
}

/// A single income or expense movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    /// Positive amount; the sign comes from `kind`
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    /// May dangle after the category is deleted; degraded at display time
    pub category_id: String,
    pub payment_method_id: String,
    #[serde(rename = "type")]
    pub kind: FlowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Signed contribution to the owning payment method's balance
    pub fn effect(&self) -> Decimal {
        match self.kind {
            FlowKind::Income => self.amount,
            FlowKind::Expense => -self.amount,
        }
    }
}

/// Money owed by or to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtLoan {
    pub id: String,
    pub person_name: String,
    /// Positive amount; direction comes from `is_debt`
    pub amount: Decimal,
    /// true: the user owes money; false: the user is owed money
    pub is_debt: bool,
    pub is_paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Informational only; never affects this method's balance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DebtLoan {
    /// Signed contribution to the aggregate total balance
    ///
    /// Paid records no longer contribute.
    pub fn aggregate_effect(&self) -> Decimal {
        if self.is_paid {
            Decimal::ZERO
        } else if self.is_debt {
            -self.amount
        } else {
            self.amount
        }
    }
}

/// A transaction category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    /// Constrains which transactions may reference this category
    #[serde(rename = "type")]
    pub kind: FlowKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FinancialCategory {
    /// The fixed default set seeded into an empty remote namespace
    pub fn seed_defaults() -> Vec<FinancialCategory> {
        let defaults = [
            ("cat-salary", "Salary", "briefcase", "#8bc34a", FlowKind::Income),
            ("cat-gifts", "Gifts", "gift", "#ffc107", FlowKind::Income),
            ("cat-food", "Food", "utensils", "#ff5722", FlowKind::Expense),
            ("cat-transport", "Transport", "bus", "#3f51b5", FlowKind::Expense),
            ("cat-shopping", "Shopping", "shopping-bag", "#e91e63", FlowKind::Expense),
            ("cat-health", "Health", "heart-pulse", "#009688", FlowKind::Expense),
        ];
        defaults
            .iter()
            .map(|(id, name, icon, color, kind)| FinancialCategory {
                id: id.to_string(),
                name: name.to_string(),
                icon: icon.to_string(),
                color: color.to_string(),
                kind: *kind,
                keywords: Vec::new(),
                updated_at: None,
            })
            .collect()
    }
}

// ==================== Kind-Generic Record ====================

/// One entity of any kind
///
/// Serializes with an explicit kind tag; used for sync intents and any
/// place a mixed-kind stream is needed. Collection documents (cache,
/// backup, remote) store the untagged entity objects instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "camelCase")]
pub enum LedgerRecord {
    PaymentMethod(PaymentMethod),
    Category(FinancialCategory),
    Transaction(Transaction),
    DebtLoan(DebtLoan),
}

impl LedgerRecord {
    pub fn id(&self) -> &str {
        match self {
            LedgerRecord::PaymentMethod(m) => &m.id,
            LedgerRecord::Category(c) => &c.id,
            LedgerRecord::Transaction(t) => &t.id,
            LedgerRecord::DebtLoan(d) => &d.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            LedgerRecord::PaymentMethod(_) => EntityKind::PaymentMethod,
            LedgerRecord::Category(_) => EntityKind::Category,
            LedgerRecord::Transaction(_) => EntityKind::Transaction,
            LedgerRecord::DebtLoan(_) => EntityKind::DebtLoan,
        }
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            LedgerRecord::PaymentMethod(m) => m.updated_at,
            LedgerRecord::Category(c) => c.updated_at,
            LedgerRecord::Transaction(t) => t.updated_at,
            LedgerRecord::DebtLoan(d) => d.updated_at,
        }
    }

    /// Stamp the record as modified now
    pub fn touch(&mut self) {
        let now = Some(Utc::now());
        match self {
            LedgerRecord::PaymentMethod(m) => m.updated_at = now,
            LedgerRecord::Category(c) => c.updated_at = now,
            LedgerRecord::Transaction(t) => t.updated_at = now,
            LedgerRecord::DebtLoan(d) => d.updated_at = now,
        }
    }

    /// Serialize to the untagged entity object used by collection documents
    pub fn to_entity_value(&self) -> serde_json::Value {
        match self {
            LedgerRecord::PaymentMethod(m) => serde_json::to_value(m),
            LedgerRecord::Category(c) => serde_json::to_value(c),
            LedgerRecord::Transaction(t) => serde_json::to_value(t),
            LedgerRecord::DebtLoan(d) => serde_json::to_value(d),
        }
        .expect("ledger entities always serialize")
    }

    /// Deserialize an untagged entity object of a known kind
    ///
    /// This is the strict validation boundary for cached, remote, and
    /// imported JSON: a record that does not match the schema (including
    /// an unparsable date) is rejected here, field errors and all.
    pub fn from_entity_value(
        kind: EntityKind,
        value: serde_json::Value,
    ) -> Result<LedgerRecord, serde_json::Error> {
        match kind {
            EntityKind::PaymentMethod => {
                serde_json::from_value(value).map(LedgerRecord::PaymentMethod)
            }
            EntityKind::Category => serde_json::from_value(value).map(LedgerRecord::Category),
            EntityKind::Transaction => serde_json::from_value(value).map(LedgerRecord::Transaction),
            EntityKind::DebtLoan => serde_json::from_value(value).map(LedgerRecord::DebtLoan),
        }
    }
}

/// Serialize a collection to the JSON array stored under its cache key
pub fn records_to_document(records: &[LedgerRecord]) -> serde_json::Value {
    serde_json::Value::Array(records.iter().map(|r| r.to_entity_value()).collect())
}

// ==================== Sync Intents ====================

/// A durable, idempotent mutation intent drained to the remote store
///
/// Intents carry enough information to be retried or replayed after a
/// crash; replaying an intent is harmless because both sides key by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum SyncIntent {
    Upsert { record: LedgerRecord },
    Delete { kind: EntityKind, id: String },
}

impl SyncIntent {
    pub fn kind(&self) -> EntityKind {
        match self {
            SyncIntent::Upsert { record } => record.kind(),
            SyncIntent::Delete { kind, .. } => *kind,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            SyncIntent::Upsert { record } => record.id(),
            SyncIntent::Delete { id, .. } => id,
        }
    }
}
