//! Per-category FAQ question catalog.
//!
//! The wizard asks a fixed list of questions for each business category and
//! stores only the answers, in order. The training payload pairs them back up.

use serde::{Deserialize, Serialize};

/// A business category and the questions the wizard asks for it.
#[derive(Debug, Clone, Copy)]
pub struct FaqCategory {
    pub key: &'static str,
    pub label: &'static str,
    pub questions: &'static [&'static str],
}

/// Label used for categories missing from the catalog.
pub const UNKNOWN_CATEGORY_LABEL: &str = "Other";

static CATEGORIES: &[FaqCategory] = &[
    FaqCategory {
        key: "restaurants",
        label: "Restaurants",
        questions: &[
            "What type of cuisine do you serve?",
            "Do you take reservations?",
            "What is the dress code or atmosphere?",
        ],
    },
    FaqCategory {
        key: "salons",
        label: "Salons & Spas",
        questions: &[
            "What services do you offer?",
            "Do you accept walk-ins?",
            "What is your cancellation policy?",
        ],
    },
    FaqCategory {
        key: "medical",
        label: "Medical Practices",
        questions: &[
            "What type of practice is this?",
            "Are you accepting new patients?",
            "Which insurance plans do you accept?",
        ],
    },
    FaqCategory {
        key: "home_services",
        label: "Home Services",
        questions: &[
            "What services do you provide?",
            "What areas do you serve?",
            "Do you offer emergency service?",
        ],
    },
    FaqCategory {
        key: "legal",
        label: "Legal Services",
        questions: &[
            "What areas of law do you practice?",
            "Do you offer free consultations?",
            "How are your fees structured?",
        ],
    },
    FaqCategory {
        key: "retail",
        label: "Retail",
        questions: &[
            "What products do you sell?",
            "What is your return policy?",
            "Do you offer delivery or pickup?",
        ],
    },
    FaqCategory {
        key: "real_estate",
        label: "Real Estate",
        questions: &[
            "Do you focus on buying, selling or rentals?",
            "Which neighborhoods do you cover?",
            "How can clients schedule a showing?",
        ],
    },
];

/// Look up a category by key (case-insensitive).
pub fn category(key: &str) -> Option<&'static FaqCategory> {
    let key = key.trim();
    CATEGORIES.iter().find(|c| c.key.eq_ignore_ascii_case(key))
}

/// Display label for a category key.
pub fn category_label(key: &str) -> &'static str {
    category(key).map(|c| c.label).unwrap_or(UNKNOWN_CATEGORY_LABEL)
}

/// A question paired with the user's stored answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

/// Zip the category's questions with stored answers.
///
/// Extra answers and unanswered questions are dropped.
pub fn faq_pairs(category_key: &str, answers: &[String]) -> Vec<QuestionAnswer> {
    let Some(category) = category(category_key) else {
        return Vec::new();
    };
    category
        .questions
        .iter()
        .zip(answers)
        .map(|(question, answer)| QuestionAnswer {
            question: (*question).to_string(),
            answer: answer.clone(),
        })
        .collect()
}
