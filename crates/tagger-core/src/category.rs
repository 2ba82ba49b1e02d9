//! # Category Mapping
//!
//! Maps merchant catalog codes (8-digit UNSPSC) onto ledger categories.
//!
//! ## Code Layout
//! ```text
//!   43 21 16 17
//!   │  │  │  └── commodity
//!   │  │  └───── class
//!   │  └──────── family
//!   └─────────── segment
//! ```
//!
//! ## Lookup
//! The table is a tree of half-open code ranges, one level per code part.
//! A range resolves either to a category (the whole subtree) or to a deeper
//! table. At every level the range starting at `00` acts as that level's
//! default; without one the parent's default is inherited, and the root
//! default is the configured default category.
//!
//! Before the tree is consulted the configured `remap` table is checked for
//! the exact code.

use crate::config::CategorySettings;

/// One node of the code tree.
#[derive(Debug)]
enum Node {
    Leaf(&'static str),
    Branch(&'static [Range]),
}

/// Half-open `[lo, hi)` range of one code part.
type Range = (u64, u64, Node);

use Node::{Branch, Leaf};

static TREE: &[Range] = &[
    (
        10,
        11,
        Branch(&[
            (10, 11, Leaf("Pets")),
            (11, 15, Leaf("Pet Food & Supplies")),
            (15, 51, Leaf("Lawn & Garden")),
        ]),
    ),
    (13, 14, Leaf("Home Supplies")),
    (
        14,
        15,
        Branch(&[(
            11,
            12,
            Branch(&[
                (0, 1, Leaf("Office Supplies")),
                // Paper towels and tissue
                (17, 18, Leaf("Home Supplies")),
            ]),
        )]),
    ),
    (20, 25, Leaf("Home Supplies")),
    (25, 26, Leaf("Service & Parts")),
    (26, 27, Leaf("Electronics & Software")),
    (27, 28, Leaf("Home Supplies")),
    (30, 32, Leaf("Home Improvement")),
    (32, 33, Leaf("Electronics & Software")),
    (39, 40, Leaf("Home Improvement")),
    (
        40,
        41,
        Branch(&[
            (0, 1, Leaf("Home Improvement")),
            (
                16,
                17,
                Branch(&[(
                    15,
                    16,
                    // Oil and air filters
                    Branch(&[(4, 6, Leaf("Service & Parts"))]),
                )]),
            ),
        ]),
    ),
    (41, 42, Leaf("Home Supplies")),
    (42, 43, Leaf("Personal Care")),
    (43, 44, Leaf("Electronics & Software")),
    (44, 45, Leaf("Office Supplies")),
    (45, 46, Leaf("Electronics & Software")),
    (
        46,
        47,
        Branch(&[
            (17, 18, Leaf("Electronics & Software")),
            (18, 19, Leaf("Home Supplies")),
        ]),
    ),
    (47, 49, Leaf("Home Supplies")),
    (49, 50, Leaf("Sporting Goods")),
    (50, 52, Leaf("Personal Care")),
    (
        52,
        53,
        Branch(&[
            (0, 1, Leaf("Home Supplies")),
            (16, 17, Leaf("Electronics & Software")),
        ]),
    ),
    (
        53,
        54,
        Branch(&[(0, 1, Leaf("Clothing")), (13, 14, Leaf("Personal Care"))]),
    ),
    (
        55,
        56,
        Branch(&[
            (10, 11, Leaf("Books")),
            (
                11,
                12,
                Branch(&[(
                    15,
                    16,
                    Branch(&[(12, 13, Leaf("Music")), (14, 15, Leaf("Movies & DVDs"))]),
                )]),
            ),
        ]),
    ),
    (
        56,
        57,
        Branch(&[
            (0, 1, Leaf("Home Supplies")),
            (
                10,
                11,
                Branch(&[(16, 17, Leaf("Lawn & Garden")), (18, 19, Leaf("Baby Supplies"))]),
            ),
        ]),
    ),
    (
        60,
        61,
        Branch(&[
            (10, 11, Leaf("Electronics & Software")),
            (12, 13, Leaf("Arts")),
            (13, 14, Leaf("Music")),
            (14, 15, Leaf("Toys")),
        ]),
    ),
];

fn find(table: &'static [Range], part: u64) -> Option<&'static Node> {
    table
        .iter()
        .find(|(lo, hi, _)| (*lo..*hi).contains(&part))
        .map(|(_, _, node)| node)
}

fn resolve<'a>(table: &'static [Range], parts: &[u64], inherited: &'a str) -> &'a str {
    let default = match find(table, 0) {
        Some(Leaf(name)) => *name,
        _ => inherited,
    };
    let Some((&part, rest)) = parts.split_first() else {
        return default;
    };
    match find(table, part) {
        Some(Leaf(name)) => *name,
        Some(Branch(child)) if !rest.is_empty() => resolve(*child, rest, default),
        _ => default,
    }
}

/// Splits a code into its segment, family, class and commodity parts.
fn code_parts(code: u64) -> [u64; 4] {
    [
        code / 1_000_000 % 100,
        code / 10_000 % 100,
        code / 100 % 100,
        code % 100,
    ]
}

/// Resolves catalog codes to category names.
#[derive(Debug, Clone)]
pub struct CategoryMapper {
    settings: CategorySettings,
}

impl CategoryMapper {
    pub fn new(settings: &CategorySettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    pub fn default_category(&self) -> &str {
        &self.settings.default_category
    }

    pub fn shipping_category(&self) -> &str {
        &self.settings.shipping_category
    }

    pub fn returns_category(&self) -> &str {
        &self.settings.returns_category
    }

    /// Category for an item's catalog code; the default category when the
    /// code is missing or unknown.
    pub fn category_for(&self, code: Option<u64>) -> String {
        let default = self.default_category();
        let Some(code) = code.filter(|c| *c != 0) else {
            return default.to_string();
        };
        if let Some(name) = self.settings.remap.get(&code.to_string()) {
            return name.clone();
        }
        resolve(TREE, &code_parts(code), default).to_string()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
