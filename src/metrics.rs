//! Prometheus metrics for observability
//!
//! All metrics live in the default registry and are exposed as text on
//! `GET /metrics`. Label sets are kept small: mode, status, model, kind.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    // ─── Agent loop ────────────────────────────────────────────────────────

    /// Agent runs by mode and terminal status (complete, max_iterations, error)
    pub static ref AGENT_TASKS: CounterVec = register_counter_vec!(
        "skillbench_agent_tasks_total",
        "Agent runs by mode and terminal status",
        &["mode", "status"]
    )
    .expect("agent task counter can be registered");

    /// Model calls per run
    pub static ref AGENT_ITERATIONS_TOTAL: HistogramVec = register_histogram_vec!(
        "skillbench_agent_iterations",
        "Model calls made per agent run",
        &["mode"],
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 15.0, 20.0]
    )
    .expect("iteration histogram can be registered");

    /// Tool invocations requested by the model
    pub static ref AGENT_TOOL_CALLS: CounterVec = register_counter_vec!(
        "skillbench_agent_tool_calls_total",
        "Tool invocations by mode and tool name",
        &["mode", "tool"]
    )
    .expect("tool call counter can be registered");

    /// Model call latency
    pub static ref LLM_CALL_TIME: HistogramVec = register_histogram_vec!(
        "skillbench_llm_call_seconds",
        "Latency of model calls",
        &["model"],
        vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("llm latency histogram can be registered");

    // ─── Code execution ────────────────────────────────────────────────────

    /// Executions by mode and status (success, error, timeout, fault)
    pub static ref CODE_EXECUTIONS: CounterVec = register_counter_vec!(
        "skillbench_code_executions_total",
        "Code executions by mode and status",
        &["mode", "status"]
    )
    .expect("execution counter can be registered");

    pub static ref CODE_EXECUTION_DURATION_TOTAL: HistogramVec = register_histogram_vec!(
        "skillbench_code_execution_seconds",
        "Wall-clock duration of code executions",
        &["mode"],
        vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("execution duration histogram can be registered");

    // ─── Environment pool ──────────────────────────────────────────────────

    /// Environments currently registered in the pool
    pub static ref POOL_LIVE_ENVIRONMENTS: Gauge = register_gauge!(
        "skillbench_pool_live_environments",
        "Execution environments currently held by the pool"
    )
    .expect("pool gauge can be registered");

    /// Time to create (and set up) a new environment
    pub static ref ENVIRONMENT_CREATE_DURATION: HistogramVec = register_histogram_vec!(
        "skillbench_environment_create_seconds",
        "Time to create and prepare an execution environment",
        &["mode", "source"],
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("environment creation histogram can be registered");

    // ─── HTTP surface ──────────────────────────────────────────────────────

    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "skillbench_requests_total",
        "Chat requests by mode",
        &["mode"]
    )
    .expect("request counter can be registered");

    pub static ref REQUESTS_IN_FLIGHT: Gauge = register_gauge!(
        "skillbench_requests_in_flight",
        "Chat streams currently open"
    )
    .expect("in-flight gauge can be registered");

    /// Errors by kind (rate_limited, bad_request, model, environment, upload)
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "skillbench_errors_total",
        "Errors by kind",
        &["kind"]
    )
    .expect("error counter can be registered");

    // ─── Best-effort collaborators ─────────────────────────────────────────

    pub static ref STORAGE_FAILURES: CounterVec = register_counter_vec!(
        "skillbench_storage_failures_total",
        "Swallowed persistence failures by operation",
        &["operation"]
    )
    .expect("storage failure counter can be registered");

    pub static ref SKILLS_FETCHES: CounterVec = register_counter_vec!(
        "skillbench_skills_fetches_total",
        "Configuration document fetches by resource and status",
        &["resource", "status"]
    )
    .expect("skills fetch counter can be registered");
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
