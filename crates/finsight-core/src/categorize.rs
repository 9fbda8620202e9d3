//! Keyword categorization for rows without a category
//!
//! Rules are checked in order and the first category with a keyword that
//! appears anywhere in the lowercased description wins. Rows that match
//! nothing land in [`FALLBACK_CATEGORY`].

/// Category for descriptions no rule matches
pub const FALLBACK_CATEGORY: &str = "Miscellaneous";

/// Ordered (category, keywords) rules; keywords are lowercase
const CATEGORY_RULES: &[(&str, &[&str])] = &[
    (
        "Groceries",
        &[
            "whole foods", "trader joe", "kroger", "safeway", "costco", "walmart", "aldi",
            "publix", "sprouts", "market", "grocery", "supermarket",
        ],
    ),
    (
        "Dining",
        &[
            "restaurant", "pizza", "sushi", "burger", "mcdonald", "chipotle", "starbucks",
            "coffee", "domino", "taco", "thai", "italian", "dinner", "lunch", "cafe", "bistro",
            "diner",
        ],
    ),
    (
        "Transport",
        &[
            "uber", "lyft", "gas station", "shell", "bp", "chevron", "exxon", "fuel", "parking",
            "transit", "metro", "taxi", "rideshare",
        ],
    ),
    (
        "Utilities",
        &[
            "electric", "electricity", "gas bill", "water bill", "internet", "phone bill",
            "utility", "power", "energy",
        ],
    ),
    (
        "Entertainment",
        &[
            "netflix", "spotify", "hulu", "disney", "cinema", "movie", "concert", "game",
            "apple store", "steam", "amazon prime", "subscription",
        ],
    ),
    (
        "Health & Fitness",
        &[
            "gym", "fitness", "planet fitness", "pharmacy", "cvs", "walgreens", "medical",
            "doctor", "health", "supplement", "hospital", "dental",
        ],
    ),
    (
        "Shopping",
        &[
            "amazon", "target", "clothing", "store", "online", "ebay", "mall", "shop", "retail",
        ],
    ),
    ("Housing", &["rent", "mortgage", "hoa", "lease"]),
    (
        "Education",
        &["course", "udemy", "coursera", "book", "school", "tuition", "training"],
    ),
    (
        "Income",
        &["salary", "deposit", "freelance", "payroll", "income", "bonus", "dividend"],
    ),
];

/// Assign a category from a free-text description
pub fn categorize(description: &str) -> &'static str {
    let desc_lower = description.to_lowercase();

    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| desc_lower.contains(kw)))
        .map(|(category, _)| *category)
        .unwrap_or(FALLBACK_CATEGORY)
}

/// All categories the keyword rules can produce, fallback last
pub fn known_categories() -> impl Iterator<Item = &'static str> {
    CATEGORY_RULES
        .iter()
        .map(|(category, _)| *category)
        .chain(std::iter::once(FALLBACK_CATEGORY))
}
