//! Keyword tables for category classification.
//!
//! Groups are checked in table order. Keep the most reliable groups first:
//! the first matching group decides the classification.

/// A named set of lowercase keywords matched as substrings.
#[derive(Debug)]
pub struct KeywordGroup {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

/// Categories that usually sell well through FBA without gating or hazmat review.
pub static FRIENDLY_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        name: "home_kitchen",
        keywords: &[
            "kitchen", "cuisine", "kueche", "küche", "home", "maison", "haushalt", "cookware",
            "ustensile", "storage", "rangement", "bathroom", "salle-de-bain", "decor", "deco",
        ],
    },
    KeywordGroup {
        name: "toys_games",
        keywords: &[
            "toy", "jouet", "spielzeug", "game", "jeux", "spiel", "puzzle", "lego", "plush",
            "peluche",
        ],
    },
    KeywordGroup {
        name: "office_school",
        keywords: &[
            "office", "bureau", "buero", "büro", "stationery", "papeterie", "school", "scolaire",
            "schreibwaren", "fourniture",
        ],
    },
    KeywordGroup {
        name: "garden_diy",
        keywords: &[
            "garden", "jardin", "garten", "outdoor", "diy", "bricolage", "heimwerker", "tool",
            "outil", "werkzeug", "hardware", "quincaillerie",
        ],
    },
    KeywordGroup {
        name: "pets",
        keywords: &[
            "pets", "pet-", "animal", "animaux", "haustier", "tierbedarf", "chien", "dog", "cat-",
        ],
    },
    KeywordGroup {
        name: "sports_leisure",
        keywords: &[
            "sport", "fitness", "camping", "loisir", "freizeit", "bike", "velo", "vélo",
            "fahrrad",
        ],
    },
    KeywordGroup {
        name: "crafts_party",
        keywords: &[
            "craft", "loisirs-creatifs", "basteln", "party", "fete", "fête", "hobby", "sewing",
            "couture",
        ],
    },
];

/// Categories that are gated, hazmat, fragile, oversized or otherwise poor FBA fits.
pub static AVOID_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        name: "hazmat",
        keywords: &[
            "aerosol", "spray", "battery", "batterie", "pile", "lithium", "perfume", "parfum",
            "chemical", "chimique", "solvent", "paint", "peinture", "farbe", "flammable",
        ],
    },
    KeywordGroup {
        name: "gated",
        keywords: &[
            "jewel", "bijou", "schmuck", "watch", "montre", "uhren", "grocery", "epicerie",
            "épicerie", "food", "aliment", "lebensmittel", "supplement", "vitamin",
            "complement", "medical", "pharma", "health", "sante", "santé",
        ],
    },
    KeywordGroup {
        name: "adult_restricted",
        keywords: &[
            "adult", "erotic", "weapon", "armes", "waffe", "knife", "couteau", "tobacco",
            "tabac", "vape", "cbd", "alcohol", "alcool", "wine", "vin-", "spirits",
        ],
    },
    KeywordGroup {
        name: "fragile_oversized",
        keywords: &[
            "furniture", "meuble", "moebel", "möbel", "mattress", "matelas", "sofa", "canape",
            "glass", "verre", "porcelain", "porcelaine", "appliance", "electromenager",
            "électroménager",
        ],
    },
    KeywordGroup {
        name: "apparel",
        keywords: &[
            "clothing", "vetement", "vêtement", "bekleidung", "shoe", "chaussure", "schuh",
            "fashion", "mode-", "lingerie",
        ],
    },
];
