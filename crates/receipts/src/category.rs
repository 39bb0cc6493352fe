//! Canonical expense taxonomy and label resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Cell Phone Service")]
    CellPhoneService,
    #[serde(rename = "Home Office")]
    HomeOffice,
    #[serde(rename = "Internet")]
    Internet,
    #[serde(rename = "Meals")]
    Meals,
    #[serde(rename = "Office Equipment")]
    OfficeEquipment,
    #[serde(rename = "Office Supplies")]
    OfficeSupplies,
    #[serde(rename = "Professional Development")]
    ProfessionalDevelopment,
    #[serde(rename = "Shipping Expenses")]
    ShippingExpenses,
    #[serde(rename = "Software Subscription")]
    SoftwareSubscription,
    #[serde(rename = "Travel Expenses")]
    TravelExpenses,
    #[serde(rename = "Other")]
    Other,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::CellPhoneService,
        Category::HomeOffice,
        Category::Internet,
        Category::Meals,
        Category::OfficeEquipment,
        Category::OfficeSupplies,
        Category::ProfessionalDevelopment,
        Category::ShippingExpenses,
        Category::SoftwareSubscription,
        Category::TravelExpenses,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CellPhoneService => "Cell Phone Service",
            Self::HomeOffice => "Home Office",
            Self::Internet => "Internet",
            Self::Meals => "Meals",
            Self::OfficeEquipment => "Office Equipment",
            Self::OfficeSupplies => "Office Supplies",
            Self::ProfessionalDevelopment => "Professional Development",
            Self::ShippingExpenses => "Shipping Expenses",
            Self::SoftwareSubscription => "Software Subscription",
            Self::TravelExpenses => "Travel Expenses",
            Self::Other => "Other",
        }
    }

    /// Tie-breaking guidance shown to the model for this category.
    pub fn rubric(&self) -> &'static str {
        match self {
            Self::CellPhoneService => {
                "monthly mobile plans and carrier bills; a phone handset purchase is Office Equipment"
            }
            Self::HomeOffice => {
                "rent share, utilities or furniture for a workspace at home; desks and chairs go here, not Office Equipment"
            }
            Self::Internet => {
                "home or office broadband and ISP bills; hosting or SaaS tools are Software Subscription"
            }
            Self::Meals => {
                "restaurants, coffee and food while working or travelling; groceries for home are not business meals"
            }
            Self::OfficeEquipment => {
                "durable hardware such as computers, monitors, printers and phones; consumables are Office Supplies"
            }
            Self::OfficeSupplies => {
                "consumables such as paper, ink, pens and small accessories under a few dozen dollars"
            }
            Self::ProfessionalDevelopment => {
                "courses, books, certifications and conference tickets; conference travel itself is Travel Expenses"
            }
            Self::ShippingExpenses => {
                "postage, couriers and packaging when shipping is the purchase; shipping fees on a product order stay with that product"
            }
            Self::SoftwareSubscription => {
                "recurring SaaS, app and cloud service charges; one-off hardware is Office Equipment"
            }
            Self::TravelExpenses => {
                "airfare, hotels, rideshare, taxis, rental cars, parking and tolls; meals on the road are Meals"
            }
            Self::Other => "only when no other category reasonably applies",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical labels in taxonomy order, suitable for a schema enum.
pub fn all_labels() -> Vec<String> {
    Category::ALL.iter().map(|c| c.as_str().to_string()).collect()
}

const SYNONYMS: &[(&str, Category)] = &[
    ("cell phone", Category::CellPhoneService),
    ("mobile plan", Category::CellPhoneService),
    ("mobile", Category::CellPhoneService),
    ("phone bill", Category::CellPhoneService),
    ("wireless", Category::CellPhoneService),
    ("home office expense", Category::HomeOffice),
    ("furniture", Category::HomeOffice),
    ("utilities", Category::HomeOffice),
    ("broadband", Category::Internet),
    ("isp", Category::Internet),
    ("wifi", Category::Internet),
    ("restaurant", Category::Meals),
    ("dining", Category::Meals),
    ("food", Category::Meals),
    ("meal", Category::Meals),
    ("coffee", Category::Meals),
    ("electronics", Category::OfficeEquipment),
    ("computer", Category::OfficeEquipment),
    ("hardware", Category::OfficeEquipment),
    ("equipment", Category::OfficeEquipment),
    ("stationery", Category::OfficeSupplies),
    ("supplies", Category::OfficeSupplies),
    ("office", Category::OfficeSupplies),
    ("training", Category::ProfessionalDevelopment),
    ("education", Category::ProfessionalDevelopment),
    ("conference", Category::ProfessionalDevelopment),
    ("course", Category::ProfessionalDevelopment),
    ("books", Category::ProfessionalDevelopment),
    ("shipping", Category::ShippingExpenses),
    ("postage", Category::ShippingExpenses),
    ("courier", Category::ShippingExpenses),
    ("saas", Category::SoftwareSubscription),
    ("subscription", Category::SoftwareSubscription),
    ("software", Category::SoftwareSubscription),
    ("cloud", Category::SoftwareSubscription),
    ("travel", Category::TravelExpenses),
    ("uber", Category::TravelExpenses),
    ("lyft", Category::TravelExpenses),
    ("airline", Category::TravelExpenses),
    ("airfare", Category::TravelExpenses),
    ("flight", Category::TravelExpenses),
    ("hotel", Category::TravelExpenses),
    ("lodging", Category::TravelExpenses),
    ("taxi", Category::TravelExpenses),
    ("parking", Category::TravelExpenses),
];

/// Outcome of mapping a free-form label onto the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryResolution {
    pub category: Category,
    /// False when the label matched nothing and fell back to `Other`.
    pub matched: bool,
}

/// Resolves a label: exact case-insensitive match, then the synonym table,
/// otherwise `Other` with `matched == false`.
pub fn resolve(label: &str) -> CategoryResolution {
    let normalized = label.trim().to_lowercase();
    if normalized.is_empty() {
        return CategoryResolution {
            category: Category::Other,
            matched: false,
        };
    }

    if let Some(category) = Category::ALL
        .iter()
        .find(|c| c.as_str().to_lowercase() == normalized)
    {
        return CategoryResolution {
            category: *category,
            matched: true,
        };
    }

    if let Some((_, category)) = SYNONYMS.iter().find(|(syn, _)| *syn == normalized) {
        return CategoryResolution {
            category: *category,
            matched: true,
        };
    }

    CategoryResolution {
        category: Category::Other,
        matched: false,
    }
}
