//! Named query-set definitions.
//!
//! The runner never sees names; the CLI resolves a name here and hands the
//! built [`QuerySet`] to the core. Definitions come from the built-in Star
//! Schema Benchmark families and, optionally, a YAML file.

use crate::queryset::{QuerySet, QuerySetError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

#[derive(thiserror::Error, Debug)]
pub enum CatalogueError {
    #[error("reading catalogue {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing catalogue {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Invalid(#[from] QuerySetError),
}

/// One argument dimension: explicit values or an arithmetic range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    Values(Vec<i64>),
    Range {
        start: i64,
        stop: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
}

fn default_step() -> i64 {
    1
}

impl ArgSpec {
    pub fn values(&self) -> Vec<i64> {
        match self {
            ArgSpec::Values(v) => v.clone(),
            ArgSpec::Range { start, stop, step } => arange(*start, *stop, *step),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySetDef {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub setup: Option<String>,
    #[serde(default)]
    pub teardown: Option<String>,
}

impl QuerySetDef {
    fn new(name: &str, template: &str, args: Vec<Vec<i64>>) -> Self {
        Self {
            name: name.to_string(),
            template: template.to_string(),
            args: args.into_iter().map(ArgSpec::Values).collect(),
            setup: None,
            teardown: None,
        }
    }

    fn with_setup(mut self, setup: &str, teardown: &str) -> Self {
        self.setup = Some(setup.to_string());
        self.teardown = Some(teardown.to_string());
        self
    }

    pub fn build(&self) -> Result<QuerySet, QuerySetError> {
        let args: Vec<Vec<i64>> = self.args.iter().map(ArgSpec::values).collect();
        QuerySet::with_setup(
            self.name.clone(),
            self.template.clone(),
            self.setup.clone().unwrap_or_default(),
            self.teardown.clone().unwrap_or_default(),
            args,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogueFile {
    #[serde(default)]
    querysets: Vec<QuerySetDef>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    defs: BTreeMap<String, QuerySetDef>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Star Schema Benchmark query families.
    pub fn builtin() -> Self {
        let mut c = Self::new();
        for def in ssb_definitions() {
            c.insert(def);
        }
        c
    }

    /// Later inserts replace earlier definitions of the same name.
    pub fn insert(&mut self, def: QuerySetDef) {
        self.defs.insert(def.name.clone(), def);
    }

    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, CatalogueError> {
        let file: CatalogueFile = serde_yaml::from_str(text).map_err(|source| CatalogueError::Parse {
            path: origin.to_string(),
            source,
        })?;
        let mut c = Self::new();
        for def in file.querysets {
            // validate eagerly so a bad file fails at load, not mid-sweep
            def.build()?;
            c.insert(def);
        }
        Ok(c)
    }

    pub fn load_yaml(path: &Path) -> Result<Self, CatalogueError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogueError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    pub fn extend(&mut self, other: Catalogue) {
        self.defs.extend(other.defs);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&QuerySetDef> {
        self.defs.get(name)
    }

    /// Build the named set. Unknown names give an empty set.
    pub fn resolve(&self, name: &str) -> Result<QuerySet, QuerySetError> {
        match self.defs.get(name) {
            Some(def) => def.build(),
            None => {
                warn!("unknown query set {}, using an empty set", name);
                Ok(QuerySet::empty(name))
            }
        }
    }
}

/// Arithmetic range, e.g. `arange(10, 20, 2) == [10, 12, 14, 16, 18]`.
pub fn arange(start: i64, stop: i64, step: i64) -> Vec<i64> {
    if step == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut n = start;
    while (step > 0 && n < stop) || (step < 0 && n > stop) {
        out.push(n);
        n += step;
    }
    out
}

/// Nations in row-id order, five per region (America, Africa, Asia, Europe, Middle East).
pub const NATIONS: [&str; 25] = [
    "CANADA", "ARGENTINA", "BRAZIL", "UNITED STATES", "PERU",
    "ETHIOPIA", "ALGERIA", "KENYA", "MOZAMBIQUE", "MOROCCO",
    "INDIA", "INDONESIA", "CHINA", "VIETNAM", "JAPAN",
    "ROMANIA", "RUSSIA", "FRANCE", "UNITED KINGDOM", "GERMANY",
    "SAUDI ARABIA", "JORDAN", "IRAN", "IRAQ", "EGYPT",
];

pub fn nation_id(name: &str) -> Option<i64> {
    NATIONS.iter().position(|n| *n == name).map(|i| i as i64)
}

/// Cities are numbered ten per nation.
fn cities_of(nation: &str) -> Vec<i64> {
    let id = nation_id(nation).unwrap_or(0);
    arange(id * 10, id * 10 + 10, 1)
}

const REVENUE: &str = r#"frame="lo_revenue_computed", field="lo_revenue_computed")"#;

fn q1(filters: &str) -> String {
    format!("Sum(\n\tIntersect(\n{}\n\t),\n{}", filters, REVENUE)
}

fn bitmap_union(frame: &str, rows: std::ops::Range<i64>) -> String {
    let items: Vec<String> = rows
        .map(|r| format!("\t\t\tBitmap(frame={}, rowID={})", frame, r))
        .collect();
    format!("\t\tUnion(\n{})", items.join(",\n"))
}

fn ssb_definitions() -> Vec<QuerySetDef> {
    let years_all = arange(1992, 1999, 1);
    let years_q3 = arange(1992, 1998, 1);
    let asia = arange(10, 15, 1);
    let us_cities = cities_of("UNITED STATES");

    vec![
        // flight 1: revenue over discount / quantity filters
        QuerySetDef::new(
            "1.1",
            &q1(r#"		Bitmap(frame="lo_year", rowID={}),
		Range(frame="lo_discount", lo_discount >= 1),
		Range(frame="lo_discount", lo_discount <= 3),
		Range(frame="lo_quantity", lo_quantity < 25)"#),
            vec![vec![1993]],
        ),
        QuerySetDef::new(
            "1.2",
            &q1(r#"		Bitmap(frame="lo_month", rowID=0),
		Bitmap(frame="lo_year", rowID={}),
		Range(frame="lo_discount", lo_discount >= 4),
		Range(frame="lo_discount", lo_discount <= 6),
		Range(frame="lo_quantity", lo_quantity >= 26),
		Range(frame="lo_quantity", lo_quantity <= 35)"#),
            vec![vec![1994]],
        ),
        QuerySetDef::new(
            "1.3",
            &q1(r#"		Bitmap(frame="lo_weeknum", rowID=6),
		Bitmap(frame="lo_year", rowID={}),
		Range(frame="lo_discount", lo_discount >= 5),
		Range(frame="lo_discount", lo_discount <= 7),
		Range(frame="lo_quantity", lo_quantity >= 26),
		Range(frame="lo_quantity", lo_quantity <= 35)"#),
            vec![vec![1994]],
        ),
        // "b" variants: bucketed frames unioned instead of range filters
        QuerySetDef::new(
            "1.1b",
            &q1(&format!(
                "\t\tBitmap(frame=\"lo_year\", rowID={{}}),\n{},\n{}",
                bitmap_union("lo_discount_b", 1..4),
                bitmap_union("lo_quantity_b", 1..25)
            )),
            vec![vec![1993]],
        ),
        QuerySetDef::new(
            "1.2b",
            &q1(&format!(
                "\t\tBitmap(frame=\"lo_month\", rowID=0),\n\t\tBitmap(frame=\"lo_year\", rowID={{}}),\n{},\n{}",
                bitmap_union("lo_discount_b", 4..7),
                bitmap_union("lo_quantity_b", 26..37)
            )),
            vec![vec![1994]],
        ),
        QuerySetDef::new(
            "1.3b",
            &q1(&format!(
                "\t\tBitmap(frame=\"lo_weeknum\", rowID=6),\n\t\tBitmap(frame=\"lo_year\", rowID={{}}),\n{},\n{}",
                bitmap_union("lo_discount_b", 5..8),
                bitmap_union("lo_quantity_b", 26..37)
            )),
            vec![vec![1994]],
        ),
        // "c" variants: between-ranges
        QuerySetDef::new(
            "1.1c",
            &q1(r#"		Bitmap(frame="lo_year", rowID={}),
		Range(frame="lo_discount", lo_discount >< [1,3]),
		Range(frame="lo_quantity", lo_quantity < 25)"#),
            vec![vec![1993]],
        ),
        QuerySetDef::new(
            "1.2c",
            &q1(r#"		Bitmap(frame="lo_month", rowID=0),
		Bitmap(frame="lo_year", rowID={}),
		Range(frame="lo_discount", lo_discount >< [4,6]),
		Range(frame="lo_quantity", lo_quantity >< [26,35])"#),
            vec![vec![1994]],
        ),
        QuerySetDef::new(
            "1.3c",
            &q1(r#"		Bitmap(frame="lo_weeknum", rowID=6),
		Bitmap(frame="lo_year", rowID={}),
		Range(frame="lo_discount", lo_discount >< [5,7]),
		Range(frame="lo_quantity", lo_quantity >< [26,35])"#),
            vec![vec![1994]],
        ),
        // flight 2: revenue by brand and year
        QuerySetDef::new(
            "2.1",
            r#"Sum(
	Intersect(
		Bitmap(frame="p_brand1", rowID={}),
		Bitmap(frame="lo_year", rowID={}),
		Bitmap(frame="s_region", rowID=0),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            // brands of MFGR#12
            vec![arange(40, 80, 1), years_all.clone()],
        ),
        QuerySetDef::new(
            "2.1r",
            r#"Sum(
	Intersect(
		Bitmap(frame="p_brand1", rowID={}),
		IntersectReg(
			Bitmap(frame="lo_year", rowID={}),
			Bitmap(frame="s_region", rowID=0),
		),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            vec![arange(40, 80, 1), years_all.clone()],
        ),
        QuerySetDef::new(
            "2.2",
            r#"Sum(
	Intersect(
		Bitmap(frame="p_brand1", rowID={}),
		Bitmap(frame="lo_year", rowID={}),
		Bitmap(frame="s_region", rowID=2),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            // MFGR#2221..MFGR#2228
            vec![arange(260, 268, 1), years_all.clone()],
        ),
        QuerySetDef::new(
            "2.3",
            r#"Sum(
	Intersect(
		Bitmap(frame="lo_year", rowID={}),
		Bitmap(frame="p_brand1", rowID=260),
		Bitmap(frame="s_region", rowID=3),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            vec![years_all.clone()],
        ),
        // flight 3: revenue by customer / supplier geography
        QuerySetDef::new(
            "3.1",
            r#"Sum(
	Intersect(
		Bitmap(frame="c_nation", rowID={}),
		Bitmap(frame="s_nation", rowID={}),
		Bitmap(frame="lo_year", rowID={}),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            vec![asia.clone(), asia.clone(), years_q3.clone()],
        ),
        QuerySetDef::new(
            "3.1r",
            r#"Sum(
	Intersect(
		Bitmap(frame="lo_year", rowID={}),
		IntersectReg(
			Bitmap(frame="c_nation", rowID={}),
			Bitmap(frame="s_nation", rowID={}),
		),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            vec![years_q3.clone(), asia.clone(), asia.clone()],
        ),
        QuerySetDef::new(
            "3.2",
            r#"Sum(
	Intersect(
		Bitmap(frame="c_city", rowID={}),
		Bitmap(frame="s_city", rowID={}),
		Bitmap(frame="lo_year", rowID={}),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            vec![us_cities.clone(), us_cities.clone(), years_q3.clone()],
        ),
        QuerySetDef::new(
            "3.2r",
            r#"Sum(
	Intersect(
		Bitmap(frame="lo_year", rowID={}),
		IntersectReg(
			Bitmap(frame="c_city", rowID={}),
			Bitmap(frame="s_city", rowID={}),
		),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            vec![years_q3.clone(), us_cities.clone(), us_cities],
        ),
        QuerySetDef::new(
            "3.3",
            r#"Sum(
	Intersect(
		Bitmap(frame="c_city", rowID={}),
		Bitmap(frame="s_city", rowID={}),
		Bitmap(frame="lo_year", rowID={}),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            vec![vec![181, 185], vec![181, 185], years_q3],
        ),
        QuerySetDef::new(
            "3.4",
            r#"Sum(
	Intersect(
		Bitmap(frame="c_city", rowID={}),
		Bitmap(frame="s_city", rowID={}),
		Bitmap(frame="lo_month", rowID=11),
		Bitmap(frame="lo_year", rowID=1997),
	),
	frame="lo_revenue", field="lo_revenue")"#,
            vec![vec![181, 185], vec![181, 185]],
        ),
        // flight 4: profit
        QuerySetDef::new(
            "4.1",
            r#"Sum(
	Intersect(
		Bitmap(frame="c_nation", rowID={}),
		Bitmap(frame="lo_year", rowID={}),
		Bitmap(frame="s_region", rowID=0),
		Union(
			Bitmap(frame="p_mfgr", rowID=1),
			Bitmap(frame="p_mfgr", rowID=2),
		)
	),
	frame="lo_profit", field="lo_profit")"#,
            vec![arange(0, 5, 1), years_all.clone()],
        ),
        QuerySetDef::new(
            "4.1r",
            r#"Sum(
	Intersect(
		Bitmap(frame="c_nation", rowID={}),
		IntersectReg(
			Bitmap(frame="lo_year", rowID={}),
			Bitmap(frame="s_region", rowID=0),
			Union(
				Bitmap(frame="p_mfgr", rowID=1),
				Bitmap(frame="p_mfgr", rowID=2),
			)
		)
	),
	frame="lo_profit", field="lo_profit")"#,
            vec![arange(0, 5, 1), years_all.clone()],
        ),
        // register variant: the shared filter is stored once and loaded per query
        QuerySetDef::new(
            "4.1rb",
            r#"Sum(
	Intersect(
		Bitmap(frame="c_nation", rowID={}),
		Bitmap(frame="lo_year", rowID={}),
		Load(id=41)),
	frame=lo_profit, field=lo_profit)"#,
            vec![arange(0, 5, 1), years_all],
        )
        .with_setup(
            r#"Store(
	Intersect(
		Bitmap(frame="s_region", rowID=0),
		Union(
			Bitmap(frame="p_mfgr", rowID=1),
			Bitmap(frame="p_mfgr", rowID=2),
		)), id=41)"#,
            "Purge(id=41)",
        ),
        QuerySetDef::new(
            "4.2",
            r#"Sum(
	Intersect(
		Bitmap(frame="p_category", rowID={}),
		Bitmap(frame="s_nation", rowID={}),
		Bitmap(frame="lo_year", rowID={}),
		Bitmap(frame="c_region", rowID=0),
	),
frame="lo_profit", field="lo_profit")"#,
            vec![arange(0, 10, 1), arange(0, 5, 1), vec![1997, 1998]],
        ),
        QuerySetDef::new(
            "4.2r",
            r#"Sum(
	Intersect(
		Bitmap(frame="p_category", rowID={}),
		IntersectReg(
			Bitmap(frame="s_nation", rowID={}),
			Bitmap(frame="lo_year", rowID={}),
			Bitmap(frame="c_region", rowID=0),
		),
	),
frame="lo_profit", field="lo_profit")"#,
            vec![arange(0, 10, 1), arange(0, 5, 1), vec![1997, 1998]],
        ),
        QuerySetDef::new(
            "4.3",
            r#"Sum(
	Intersect(
		Bitmap(frame="p_brand1", rowID={}),
		Bitmap(frame="s_city", rowID={}),
		Bitmap(frame="lo_year", rowID={}),
		Bitmap(frame="c_region", rowID=0),
	),
frame="lo_profit", field="lo_profit")"#,
            vec![arange(120, 160, 1), arange(30, 40, 1), vec![1997, 1998]],
        ),
        QuerySetDef::new(
            "4.3r",
            r#"Sum(
	Intersect(
		Bitmap(frame="p_brand1", rowID={}),
		IntersectReg(
			Bitmap(frame="lo_year", rowID={}),
			Bitmap(frame="s_city", rowID={}),
			Bitmap(frame="c_region", rowID=0),
		),
	),
frame="lo_profit", field="lo_profit")"#,
            vec![arange(120, 160, 1), vec![1997, 1998], arange(30, 40, 1)],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arange_matches_half_open_range() {
        assert_eq!(arange(10, 20, 2), vec![10, 12, 14, 16, 18]);
        assert_eq!(arange(5, 0, -2), vec![5, 3, 1]);
        assert!(arange(0, 5, 0).is_empty());
    }

    #[test]
    fn every_builtin_builds() {
        let c = Catalogue::builtin();
        assert_eq!(c.names().count(), 26);
        for name in c.names() {
            let qs = c.resolve(name).unwrap();
            assert!(qs.size() >= 1, "{} is empty", name);
        }
    }

    #[test]
    fn builtin_grid_sizes() {
        let c = Catalogue::builtin();
        assert_eq!(c.resolve("2.1").unwrap().size(), 40 * 7);
        assert_eq!(c.resolve("3.1").unwrap().size(), 5 * 5 * 6);
        assert_eq!(c.resolve("4.3").unwrap().size(), 40 * 10 * 2);
        assert_eq!(c.resolve("1.1b").unwrap().size(), 1);
    }

    #[test]
    fn us_cities_are_thirty_to_thirty_nine() {
        assert_eq!(nation_id("UNITED STATES"), Some(3));
        let qs = Catalogue::builtin().resolve("3.2").unwrap();
        assert_eq!(qs.arg_sets()[0], (30..40).collect::<Vec<i64>>());
    }

    #[test]
    fn register_set_has_setup_and_teardown() {
        let qs = Catalogue::builtin().resolve("4.1rb").unwrap();
        assert!(qs.setup().unwrap().starts_with("Store("));
        assert_eq!(qs.teardown(), Some("Purge(id=41)"));
    }

    #[test]
    fn unknown_name_is_empty() {
        let qs = Catalogue::builtin().resolve("9.9").unwrap();
        assert!(qs.is_empty());
        assert_eq!(qs.name(), "9.9");
    }

    #[test]
    fn yaml_definitions_override_builtins() {
        let text = r#"
querysets:
  - name: "2.3"
    template: "Count(Bitmap(frame=lo_year, rowID={}))"
    args:
      - { start: 1992, stop: 1995 }
  - name: pairs
    template: "Count(Intersect(Bitmap(frame=a, rowID={}), Bitmap(frame=b, rowID={})))"
    args:
      - [1, 2]
      - [7, 8, 9]
"#;
        let mut c = Catalogue::builtin();
        c.extend(Catalogue::from_yaml_str(text, "inline").unwrap());
        let overridden = c.resolve("2.3").unwrap();
        assert_eq!(overridden.size(), 3);
        assert_eq!(overridden.query_at(2), "Count(Bitmap(frame=lo_year, rowID=1994))\n");
        assert_eq!(c.resolve("pairs").unwrap().size(), 6);
    }

    #[test]
    fn yaml_slot_mismatch_fails_at_load() {
        let text = r#"
querysets:
  - name: bad
    template: "Count(Bitmap(frame=a, rowID={}))"
    args: []
"#;
        let err = Catalogue::from_yaml_str(text, "inline").unwrap_err();
        assert!(matches!(err, CatalogueError::Invalid(QuerySetError::SlotMismatch { .. })));
    }
}
