//! Reference data: medications, branches, users, prescriptions, inventory
//!
//! The store is read-only for the duration of a turn and returns explicit
//! not-found values rather than erroring. The bundled in-memory store ships
//! with the synthetic bilingual catalog used by the demo deployment; a real
//! deployment implements [`ReferenceStore`] over its own backend.

use crate::text::AliasRecord;
use crate::types::{BranchId, MedicationId, PrescriptionId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// A medication record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: MedicationId,
    pub display_name: String,
    /// Alternative names: brand names, abbreviations, Hebrew spellings,
    /// and common misspellings
    pub aliases: Vec<String>,
    pub active_ingredient: String,
    pub rx_required: bool,
    /// Factual label-like summary, never advice
    pub label_summary: String,
}

impl AliasRecord for Medication {
    fn record_id(&self) -> &str {
        self.id.as_str()
    }
    fn display_name(&self) -> &str {
        &self.display_name
    }
    fn aliases(&self) -> &[String] {
        &self.aliases
    }
}

/// A pharmacy branch record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub display_name: String,
    /// City abbreviations and multilingual spellings
    pub aliases: Vec<String>,
}

impl AliasRecord for Branch {
    fn record_id(&self) -> &str {
        self.id.as_str()
    }
    fn display_name(&self) -> &str {
        &self.display_name
    }
    fn aliases(&self) -> &[String] {
        &self.aliases
    }
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
}

/// Stored prescription status, as recorded at write time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrescriptionStatus {
    Valid,
    Expired,
    Cancelled,
}

/// Prescription status after reconciling the stored status with today's date
///
/// Stored `VALID` records go stale: a prescription past its expiry date must
/// render as expired even if the stored status was never updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EffectiveStatus {
    Valid,
    Expired,
    Cancelled,
}

impl fmt::Display for EffectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectiveStatus::Valid => write!(f, "VALID"),
            EffectiveStatus::Expired => write!(f, "EXPIRED"),
            EffectiveStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A prescription record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: PrescriptionId,
    pub user_id: UserId,
    pub medication_id: MedicationId,
    pub status: PrescriptionStatus,
    pub expires_on: NaiveDate,
}

impl Prescription {
    /// Reconcile the stored status against `today`.
    ///
    /// CANCELLED always wins; otherwise EXPIRED when stored as such or when
    /// `today` is strictly after the expiry date; otherwise VALID.
    pub fn effective_status(&self, today: NaiveDate) -> EffectiveStatus {
        match self.status {
            PrescriptionStatus::Cancelled => EffectiveStatus::Cancelled,
            PrescriptionStatus::Expired => EffectiveStatus::Expired,
            PrescriptionStatus::Valid => {
                if today > self.expires_on {
                    EffectiveStatus::Expired
                } else {
                    EffectiveStatus::Valid
                }
            }
        }
    }
}

/// Inventory status for a (branch, medication) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
    /// Sentinel for pairs the inventory map does not cover; lookups always
    /// succeed, they never fail
    Unknown,
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockStatus::InStock => write!(f, "in stock"),
            StockStatus::LowStock => write!(f, "low stock"),
            StockStatus::OutOfStock => write!(f, "out of stock"),
            StockStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Read-only reference data access
///
/// All lookups are synchronous and return explicit not-found values. Records
/// are immutable for the duration of a turn.
pub trait ReferenceStore: Send + Sync {
    /// All medications, in stable catalog order
    fn medications(&self) -> &[Medication];

    /// All branches, in stable catalog order
    fn branches(&self) -> &[Branch];

    fn medication(&self, id: &MedicationId) -> Option<&Medication>;

    fn branch(&self, id: &BranchId) -> Option<&Branch>;

    fn user(&self, id: &UserId) -> Option<&User>;

    fn prescription(&self, id: &PrescriptionId) -> Option<&Prescription>;

    /// All prescriptions owned by a user, in catalog order
    fn prescriptions_for(&self, user_id: &UserId) -> Vec<&Prescription>;

    /// Inventory status for a (branch, medication) pair.
    ///
    /// Always returns a status; pairs missing from the inventory map yield
    /// [`StockStatus::Unknown`].
    fn stock_status(&self, branch_id: &BranchId, medication_id: &MedicationId) -> StockStatus;
}

/// In-memory [`ReferenceStore`] implementation
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceStore {
    medications: Vec<Medication>,
    branches: Vec<Branch>,
    users: Vec<User>,
    prescriptions: Vec<Prescription>,
    inventory: HashMap<(BranchId, MedicationId), StockStatus>,
}

impl InMemoryReferenceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with the synthetic demo catalog
    pub fn demo() -> Self {
        let mut store = Self::new();

        store.add_medication(Medication {
            id: MedicationId::new("med_001"),
            display_name: "Ibuprofen".to_string(),
            aliases: to_strings(&[
                "Advil",
                "Nurofen",
                "Ibu",
                "Iboprofen", // common typo
                "אדביל",
                "נורופן",
                "איבופרופן",
                "איבו",
            ]),
            active_ingredient: "Ibuprofen".to_string(),
            rx_required: false,
            label_summary:
                "Nonsteroidal anti-inflammatory drug (NSAID) used for pain and fever relief."
                    .to_string(),
        });
        store.add_medication(Medication {
            id: MedicationId::new("med_002"),
            display_name: "Paracetamol".to_string(),
            aliases: to_strings(&[
                "Acetaminophen",
                "Tylenol",
                "Panadol",
                "Para",
                "אצטמינופן",
                "טילנול",
                "פנדול",
                "פרצטמול",
            ]),
            active_ingredient: "Paracetamol (Acetaminophen)".to_string(),
            rx_required: false,
            label_summary: "Analgesic/antipyretic used for pain and fever relief.".to_string(),
        });
        store.add_medication(Medication {
            id: MedicationId::new("med_003"),
            display_name: "Amoxicillin".to_string(),
            aliases: to_strings(&["Amox", "Amoxil", "אמוקסילין", "אמוקסי", "אמוקס"]),
            active_ingredient: "Amoxicillin".to_string(),
            rx_required: true,
            label_summary: "Penicillin-class antibiotic for bacterial infections.".to_string(),
        });
        store.add_medication(Medication {
            id: MedicationId::new("med_004"),
            display_name: "Omeprazole".to_string(),
            aliases: to_strings(&["Prilosec", "Losec", "פרילוסק", "לוסק", "אומפרזול"]),
            active_ingredient: "Omeprazole".to_string(),
            rx_required: false,
            label_summary: "Proton pump inhibitor (PPI) that reduces stomach acid.".to_string(),
        });
        store.add_medication(Medication {
            id: MedicationId::new("med_005"),
            display_name: "Atorvastatin".to_string(),
            aliases: to_strings(&["Lipitor", "Atorva", "אטורבסטטין", "אטורבה", "ליפיתור"]),
            active_ingredient: "Atorvastatin".to_string(),
            rx_required: true,
            label_summary: "Statin medication used to lower LDL cholesterol.".to_string(),
        });

        store.add_branch(Branch {
            id: BranchId::new("branch_001"),
            display_name: "Tel Aviv Center".to_string(),
            aliases: to_strings(&["tlv", "ta", "tel aviv", "תל אביב", "תא"]),
        });
        store.add_branch(Branch {
            id: BranchId::new("branch_002"),
            display_name: "Haifa".to_string(),
            aliases: to_strings(&["ha", "חיפה"]),
        });
        store.add_branch(Branch {
            id: BranchId::new("branch_003"),
            display_name: "Jerusalem".to_string(),
            aliases: to_strings(&["jlm", "ירושלים"]),
        });
        store.add_branch(Branch {
            id: BranchId::new("branch_004"),
            display_name: "Beer Sheva".to_string(),
            aliases: to_strings(&["b7", "באר שבע"]),
        });

        for i in 1..=10u32 {
            store.add_user(User {
                id: UserId::new(format!("user_{i:03}")),
                full_name: format!("User {i}"),
            });
        }

        store.add_prescription(Prescription {
            id: PrescriptionId::new("RX-1001"),
            user_id: UserId::new("user_009"),
            medication_id: MedicationId::new("med_003"),
            status: PrescriptionStatus::Valid,
            expires_on: NaiveDate::from_ymd_opt(2027, 5, 1).expect("valid seed date"),
        });
        store.add_prescription(Prescription {
            id: PrescriptionId::new("RX-1002"),
            user_id: UserId::new("user_010"),
            medication_id: MedicationId::new("med_005"),
            status: PrescriptionStatus::Valid,
            expires_on: NaiveDate::from_ymd_opt(2024, 12, 1).expect("valid seed date"),
        });
        store.add_prescription(Prescription {
            id: PrescriptionId::new("RX-1003"),
            user_id: UserId::new("user_009"),
            medication_id: MedicationId::new("med_005"),
            status: PrescriptionStatus::Cancelled,
            expires_on: NaiveDate::from_ymd_opt(2026, 1, 15).expect("valid seed date"),
        });

        store.set_stock("branch_001", "med_001", StockStatus::InStock);
        store.set_stock("branch_001", "med_002", StockStatus::LowStock);
        store.set_stock("branch_001", "med_003", StockStatus::OutOfStock);
        store.set_stock("branch_002", "med_001", StockStatus::InStock);
        store.set_stock("branch_002", "med_004", StockStatus::InStock);
        store.set_stock("branch_003", "med_002", StockStatus::InStock);
        store.set_stock("branch_004", "med_005", StockStatus::LowStock);

        info!(
            medications = store.medications.len(),
            branches = store.branches.len(),
            users = store.users.len(),
            prescriptions = store.prescriptions.len(),
            "demo reference store seeded"
        );

        store
    }

    pub fn add_medication(&mut self, medication: Medication) {
        self.medications.push(medication);
    }

    pub fn add_branch(&mut self, branch: Branch) {
        self.branches.push(branch);
    }

    pub fn add_user(&mut self, user: User) {
        self.users.push(user);
    }

    pub fn add_prescription(&mut self, prescription: Prescription) {
        self.prescriptions.push(prescription);
    }

    pub fn set_stock(
        &mut self,
        branch_id: impl Into<BranchId>,
        medication_id: impl Into<MedicationId>,
        status: StockStatus,
    ) {
        self.inventory
            .insert((branch_id.into(), medication_id.into()), status);
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl ReferenceStore for InMemoryReferenceStore {
    fn medications(&self) -> &[Medication] {
        &self.medications
    }

    fn branches(&self) -> &[Branch] {
        &self.branches
    }

    fn medication(&self, id: &MedicationId) -> Option<&Medication> {
        self.medications.iter().find(|m| &m.id == id)
    }

    fn branch(&self, id: &BranchId) -> Option<&Branch> {
        self.branches.iter().find(|b| &b.id == id)
    }

    fn user(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    fn prescription(&self, id: &PrescriptionId) -> Option<&Prescription> {
        self.prescriptions.iter().find(|p| &p.id == id)
    }

    fn prescriptions_for(&self, user_id: &UserId) -> Vec<&Prescription> {
        self.prescriptions
            .iter()
            .filter(|p| &p.user_id == user_id)
            .collect()
    }

    fn stock_status(&self, branch_id: &BranchId, medication_id: &MedicationId) -> StockStatus {
        self.inventory
            .get(&(branch_id.clone(), medication_id.clone()))
            .copied()
            .unwrap_or(StockStatus::Unknown)
    }
}
