//! harness.rs
//! Runs a simulation configuration: fetches every model and forecast sheet it
//! needs, instantiates the root model once per scenario, drives the mean pass
//! and the Monte Carlo trials of every month and aggregates the facts.

use crate::aggregation::aggregate;
use crate::config::graph::{GraphModelDef, Process, ProcessPort, ProcessType, VersionedDependency};
use crate::config::simulation::{InportBinding, RunOptions, Scenario, SimulationConfiguration};
use crate::elements::ElementRegistry;
use crate::error::{Result, SimError, SimulationStage};
use crate::graph::lifecycle::{ActiveNode, Lifecycle};
use crate::graph::model::GraphModel;
use crate::param::load_ops::make_breakdown_relative;
use crate::param::{Aspect, NumberParam, Param};
use crate::simulation::environment::Environment;
use crate::simulation::resolver::{
    fetch_model_tree, fetch_sheets, ForecastResolver, GraphModelLibrary, ModelResolver, SheetLibrary,
};
use crate::simulation::result::SimulationResult;
use crate::store::{NodeStore, RuntimeMessage, StackFrame};
use rand::Rng;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Random stream of one pass: scenario, month and trial each get their own
/// bit range; trial 0 is the mean pass.
pub fn pass_stream(scenario_idx: usize, month_idx: usize, mc_run: Option<u32>) -> u64 {
    let trial = mc_run.map_or(0, |r| u64::from(r) + 1);
    ((scenario_idx as u64) << 40) | ((month_idx as u64) << 20) | trial
}

/// Wraps the root model in a process so it is instantiated like any nested
/// model: object id `root`, one process port per model port.
pub fn generate_root_process(gm: &GraphModelDef, version: &str) -> Process {
    let mut p = Process::new("root", ProcessType::GraphModel, gm.object_id.clone());
    p.label = Some(gm.label.clone().unwrap_or_else(|| "Root Model".to_string()));
    p.name = Some("root".to_string());
    p.release_nr = version.strip_prefix('r').and_then(|n| n.parse().ok());
    for id in gm.inports.keys() {
        p.inports.insert(id.clone(), ProcessPort::new(id.clone(), id.clone()));
    }
    for id in gm.outports.keys() {
        p.outports.insert(id.clone(), ProcessPort::new(id.clone(), id.clone()));
    }
    p
}

fn absolute_from_relative(value: f64, aspect: &Aspect) -> Aspect {
    Aspect::new(aspect.name.clone(), aspect.slices.iter().map(|(k, v)| (k.clone(), v * value.abs())))
}

/// Turns resolved inputs into the loads of one pass.
///
/// Numbers keep only their relative aspects, made absolute against the
/// value. Random numbers collapse to their mean (mean pass) or one draw
/// (trial) and carry their aspects as relative breakdowns. Anything else
/// passes unchanged.
pub fn monte_carlo_sample<R: Rng + ?Sized>(
    inputs: &[(String, Param)],
    mean: bool,
    rng: &mut R,
) -> Result<Vec<(String, Param)>> {
    let mut sampled = Vec::with_capacity(inputs.len());
    for (port, input) in inputs {
        let load = match input {
            Param::Number(n) if n.has_aspect() => Param::Number(NumberParam {
                value: n.value,
                unit: n.unit.clone(),
                aspects: n
                    .aspects
                    .iter()
                    .filter(|a| a.relative)
                    .map(|a| absolute_from_relative(n.value, a))
                    .collect(),
            }),
            Param::Random(r) => Param::Number(NumberParam {
                value: if mean { r.mean() } else { r.sample(rng)? },
                unit: r.unit.clone(),
                aspects: r.aspects.iter().map(make_breakdown_relative).collect(),
            }),
            other => other.clone(),
        };
        sampled.push((port.clone(), load));
    }
    Ok(sampled)
}

/// Why a scenario stopped, with the context it stopped in.
#[derive(Debug)]
struct ScenarioFailure {
    error: SimError,
    stage: SimulationStage,
    stack: Vec<StackFrame>,
    warnings: Vec<RuntimeMessage>,
}

impl ScenarioFailure {
    fn new(error: SimError, env: &Environment) -> Self {
        Self {
            error,
            stage: env.stage(),
            stack: env.exec_stack().to_vec(),
            warnings: env.store().warnings(),
        }
    }
}

/// Everything a scenario run reads, shared across the rayon pool.
struct RunContext<'c> {
    config: &'c SimulationConfiguration,
    root_def: Arc<GraphModelDef>,
    root_process: Process,
    models: Arc<GraphModelLibrary>,
    elements: Arc<ElementRegistry>,
    sheets: SheetLibrary,
    months: Vec<String>,
    seed: u64,
}

impl RunContext<'_> {
    /// Scenario inputs of one month, forecast references resolved.
    fn resolve_inputs(&self, scenario: &Scenario, date: &str) -> Result<Vec<(String, Param)>> {
        let mut inputs = Vec::with_capacity(scenario.inports.len());
        for (port, binding) in &scenario.inports {
            let value = match binding {
                InportBinding::Literal(p) => p.clone(),
                InportBinding::Forecast(var_ref) => {
                    let sheet = self.config.sheet_ref(&var_ref.sheet_ref_id)?;
                    self.sheets
                        .get(&(sheet.reference.clone(), sheet.version()))
                        .and_then(|projection| projection.variable_value(&var_ref.variable_id, date))
                        .cloned()
                        .ok_or_else(|| SimError::ForecastValue {
                            variable: var_ref.variable_id.clone(),
                            date: date.to_string(),
                        })?
                }
            };
            inputs.push((port.clone(), value));
        }
        Ok(inputs)
    }

    #[instrument(skip_all, fields(scenario = %scenario.object_id))]
    fn run_scenario(&self, scenario_idx: usize, scenario: &Scenario) -> std::result::Result<NodeStore, ScenarioFailure> {
        let mut env = Environment::new(Arc::clone(&self.elements), Arc::clone(&self.models), self.seed);
        let mut root = GraphModel::new(Arc::clone(&self.root_def), self.root_process.clone(), None);

        env.set_stage(SimulationStage::Setup);
        if let Err(e) = root.try_init(&mut env) {
            error!(model = %root.label(), error = %e, "graph model init failed");
            return Err(ScenarioFailure::new(SimError::InitializationFailed, &env));
        }
        info!(nodes = env.store().len(), months = self.months.len(), "scenario started");
        debug!(order = ?root.execution_order(), "root model initialized");

        env.set_stage(SimulationStage::Simulation);
        let trials = self.config.monte_carlo_trials();
        for (month_idx, date) in self.months.iter().enumerate() {
            let inputs = self.resolve_inputs(scenario, date).map_err(|e| ScenarioFailure::new(e, &env))?;
            let passes = std::iter::once(None).chain((0..trials).map(Some));
            for mc_run in passes {
                env.begin_pass(&scenario.object_id, date, mc_run, pass_stream(scenario_idx, month_idx, mc_run));
                debug!(date = %date, mc_run = ?mc_run, "pass");
                let loads = monte_carlo_sample(&inputs, mc_run.is_none(), env.rng())
                    .map_err(|e| ScenarioFailure::new(e, &env))?;
                root.reset();
                for (port, load) in loads {
                    root.accept_load(load, Some(&port));
                }
                root.process(&mut env);
                root.process_response(&mut env);
            }
        }
        Ok(env.into_store())
    }
}

/// Runs configurations against the given collaborators.
pub struct SimulationHarness<'r> {
    models: &'r dyn ModelResolver,
    forecasts: &'r dyn ForecastResolver,
    elements: Arc<ElementRegistry>,
    options: RunOptions,
}

impl<'r> SimulationHarness<'r> {
    pub fn new(models: &'r dyn ModelResolver, forecasts: &'r dyn ForecastResolver) -> Self {
        Self { models, forecasts, elements: Arc::new(ElementRegistry::builtin()), options: RunOptions::default() }
    }

    pub fn with_elements(mut self, elements: ElementRegistry) -> Self {
        self.elements = Arc::new(elements);
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Fetches models and sheets and prepares the shared run context.
    fn setup<'c>(&self, config: &'c SimulationConfiguration) -> Result<RunContext<'c>> {
        let months = config.months()?;
        let version = config.model_version();
        let root = VersionedDependency {
            id: config.reference.clone(),
            version: version.clone(),
            name: config.model_name.clone().unwrap_or_else(|| "root".to_string()),
        };
        let models = fetch_model_tree(self.models, root)?;
        info!(models = models.len(), "fetched all models");

        let mut deps: Vec<VersionedDependency> = Vec::new();
        for scenario in config.active_scenarios() {
            for dep in config.needed_sheet_deps(scenario)? {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        let sheets = fetch_sheets(self.forecasts, &deps)?;
        if !sheets.is_empty() {
            info!(sheets = sheets.len(), "fetched forecast sheets");
        }

        let root_def = models.get(&config.reference, &version).ok_or_else(|| SimError::UnknownModel {
            id: config.reference.clone(),
            version: version.clone(),
        })?;
        let root_process = generate_root_process(&root_def, &version);
        Ok(RunContext {
            config,
            root_def,
            root_process,
            models: Arc::new(models),
            elements: Arc::clone(&self.elements),
            sheets,
            months,
            seed: self.options.seed,
        })
    }

    /// Runs every enabled scenario of `config` and returns the finished (or
    /// failed) result. Never panics on bad input; failures land in the result.
    #[instrument(skip_all, fields(config = %config.object_id, model = %config.reference))]
    pub fn run(&self, config: &SimulationConfiguration) -> SimulationResult {
        let mut result = SimulationResult::queued(config);

        let ctx = match self.setup(config) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, "simulation setup failed");
                result.fail(&e, SimulationStage::Setup, Vec::new(), Vec::new());
                return result;
            }
        };
        result.start();

        let scenarios: Vec<(usize, &Scenario)> = config.active_scenarios().enumerate().collect();
        info!(scenarios = scenarios.len(), months = ctx.months.len(), trials = config.monte_carlo_trials(), "running");
        let outcomes: Vec<std::result::Result<NodeStore, ScenarioFailure>> = if self.options.parallel {
            scenarios.par_iter().map(|(idx, s)| ctx.run_scenario(*idx, s)).collect()
        } else {
            scenarios.iter().map(|(idx, s)| ctx.run_scenario(*idx, s)).collect()
        };

        let mut store = NodeStore::new();
        for outcome in outcomes {
            match outcome {
                Ok(scenario_store) => store.merge(scenario_store),
                Err(failure) => {
                    error!(error = %failure.error, stage = ?failure.stage, "simulation failed");
                    let mut warnings = store.warnings();
                    warnings.extend(failure.warnings);
                    result.fail(&failure.error, failure.stage, failure.stack, warnings);
                    return result;
                }
            }
        }

        let warnings = store.warnings();
        let nodes = if self.options.inhibit_aggregation {
            store
        } else {
            let scenario_ids: Vec<String> = scenarios.iter().map(|(_, s)| s.object_id.clone()).collect();
            aggregate(store, &scenario_ids, &ctx.months)
        };
        result.finish(nodes.into_nodes(), warnings);
        info!(nodes = result.nodes.len(), warnings = result.warnings.len(), "simulation done");
        result
    }
}
