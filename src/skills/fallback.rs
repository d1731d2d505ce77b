//! Embedded copies used when the remote documents are unset or unreachable

/// Skills document served when the remote copy cannot be fetched
pub const FALLBACK_SKILLS_DOCUMENT: &str = r#"# Data analysis skills

## Loading data
- Uploaded files live under /home/user/. Check the extension before choosing a reader.
- CSV: `pd.read_csv(path)`; pass `sep=None, engine="python"` when the delimiter is unknown.
- Excel: `pd.read_excel(path, sheet_name=None)` returns every sheet; list them before picking one.
- Always print `df.shape`, `df.dtypes` and `df.head()` after loading.

## Cleaning
- Parse dates explicitly with `pd.to_datetime(col, errors="coerce")` and report how many failed.
- Strip currency symbols and thousands separators before casting to numbers.
- Report missing values per column before dropping or imputing anything.

## Analysis
- Prefer vectorised pandas operations over Python loops.
- For group comparisons use `groupby(...).agg(...)` with named aggregations.
- Use `scipy.stats` for significance tests and always state the test and p-value.
- For regressions use `statsmodels.formula.api` and print the summary table.

## Charts
- Use matplotlib with seaborn styling; one figure per call, titled and with labelled axes.
- Call `plt.tight_layout()` then `plt.show()` so the chart is captured.
- Never plot more than ~20 categories on one axis; aggregate the tail into "Other".

## Reporting
- Lead the final answer with the direct result, then supporting numbers.
- Round to sensible precision and include units.
"#;

/// Package list installed when no pre-built template exists
pub const FALLBACK_PACKAGES: &[&str] = &[
    "pandas",
    "numpy",
    "matplotlib",
    "seaborn",
    "scipy",
    "scikit-learn",
    "statsmodels",
    "openpyxl",
];
