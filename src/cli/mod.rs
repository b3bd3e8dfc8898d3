//! SW-017: CLI subcommands — init, validate, plan, deploy, destroy, status,
//! completions.

use crate::core::{parser, state, types, ApplyConfig, Stack};
use crate::provider::{HookProvisioner, Provisioner, SimulatedProvisioner};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "stackwright",
    version,
    about = "Declarative serverless stacks — dependency DAG, leveled creation, automatic rollback"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which provisioning collaborator performs the cloud calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// In-process simulation with deterministic outputs
    Simulated,
    /// External program invoked once per create/delete
    Hook,
}

/// Options shared by deploy and destroy.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Provisioning collaborator
    #[arg(long, value_enum, default_value_t = ProviderKind::Simulated)]
    pub provider: ProviderKind,

    /// Hook program (with --provider hook)
    #[arg(long)]
    pub hook: Option<PathBuf>,

    /// Leading argument for the hook program (repeatable)
    #[arg(long = "hook-arg", allow_hyphen_values = true)]
    pub hook_args: Vec<String>,

    /// Override policy.concurrency
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Override policy.timeout_secs
    #[arg(long)]
    pub timeout: Option<u64>,

    /// State directory
    #[arg(long, default_value = "state")]
    pub state_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stackwright project with the events application
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate stack.yaml without calling any provider
    Validate {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,
    },

    /// Show the leveled creation (or teardown) plan
    Plan {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,

        /// Show the teardown plan of the deployed resources instead
        #[arg(long)]
        destroy: bool,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Create every resource in dependency order
    Deploy {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Delete every deployed resource in reverse dependency order
    Destroy {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show deployed stacks from lock files
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub async fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan {
            file,
            destroy,
            state_dir,
        } => cmd_plan(&file, &state_dir, destroy),
        Commands::Deploy { file, run } => cmd_deploy(&file, &run).await,
        Commands::Destroy { file, run } => cmd_destroy(&file, &run).await,
        Commands::Status { state_dir } => cmd_status(&state_dir),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "stackwright",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

/// The events application: table, graph API with key, schema and
/// resolvers, a proxy function with its layer, and a REST front door.
const EVENTS_TEMPLATE: &str = r#"version: "1.0"
name: events-stack
description: "Events table behind a graph API, proxied by a function and a REST API"

params:
  table_name: events
  region: us-east-1

resources:
  events:
    kind: table
    config:
      name: "{{params.table_name}}"
      partitionKeyName: id
      partitionKeyType: S
      billingMode: PAY_PER_REQUEST
      streamEnabled: NEW_IMAGE

  eventsApi:
    kind: graph_api
    config:
      name: eventsApi
      authMode: API_KEY

  eventsApiKey:
    kind: api_key
    config:
      apiId: { ref: eventsApi.apiId }

  eventsSchema:
    kind: graph_schema
    config:
      apiId: { ref: eventsApi.apiId }
      schemaDocument: |
        input {{params.table_name}}Input {
          name: String
          topic: String
          date: String
        }
        type {{params.table_name}} {
          id: ID!
          name: String
          topic: String
          date: String
        }
        type Query {
          listEvents: [{{params.table_name}}]!
          getEvent(id: ID!): {{params.table_name}}
        }
        type Mutation {
          saveEvent(input: {{params.table_name}}Input!): {{params.table_name}}
          deleteEvent(id: ID!): {{params.table_name}}
        }
        type Schema {
          query: Query
          mutation: Mutation
        }

  eventsDynamoDBRole:
    kind: role
    config:
      trustedPrincipal: appsync.amazonaws.com
      managedPolicyNames: [AmazonDynamoDBFullAccess]

  eventsDataSource:
    kind: data_source
    config:
      apiId: { ref: eventsApi.apiId }
      name: eventsDataSource
      backingTableName: { ref: events.tableName }
      region: "{{params.region}}"
      roleArn: { ref: eventsDynamoDBRole.roleArn }

  getEventQueryResolver:
    kind: resolver
    config:
      apiId: { ref: eventsApi.apiId }
      typeName: Query
      fieldName: getEvent
      dataSourceName: { ref: eventsDataSource.dataSourceName }
      requestTemplate: |
        {
          "version": "2017-02-28",
          "operation": "GetItem",
          "key": {
            "id": $util.dynamodb.toDynamoDBJson($ctx.args.id)
          }
        }
      responseTemplate: $util.toJson($ctx.result)
      dependsOnSchema: eventsSchema

  listEventsQueryResolver:
    kind: resolver
    config:
      apiId: { ref: eventsApi.apiId }
      typeName: Query
      fieldName: listEvents
      dataSourceName: { ref: eventsDataSource.dataSourceName }
      requestTemplate: |
        {
          "version": "2017-02-28",
          "operation": "Scan"
        }
      responseTemplate: $util.toJson($ctx.result.items)
      dependsOnSchema: eventsSchema

  lambdaRequestsLayer:
    kind: layer
    config:
      name: lambda_requests_layer
      codeLocation: resources/requests.zip
      compatibleRuntimes: [python3.8]

  proxyLambda:
    kind: function
    config:
      name: proxy_lambda
      runtimeConfig: python3.8
      codeLocation: resources
      handlerName: events_info.handler
      memoryMb: 128
      envVars:
        APPSYNC_API_KEY: { ref: eventsApiKey.apiKeyValue }
        APPSYNC_API_ENDPOINT_URL: { ref: eventsApi.graphQlUrl }
      layers:
        - { ref: lambdaRequestsLayer.layerArn }

  eventsRestApi:
    kind: rest_api
    config:
      name: events_rest_api
      handlerFunctionName: { ref: proxyLambda.functionName }

  graphqlResource:
    kind: rest_resource
    config:
      restApiId: { ref: eventsRestApi.restApiId }
      parentResourceId: { ref: eventsRestApi.rootResourceId }
      pathPart: graphql

  graphqlGet:
    kind: rest_method
    config:
      restApiId: { ref: eventsRestApi.restApiId }
      resourceId: { ref: graphqlResource.resourceId }
      httpMethod: GET
      integrationTargetFunctionName: { ref: proxyLambda.functionName }
      integrationResponses:
        - statusCode: "400"
        - statusCode: "500"
        - statusCode: "200"

policy:
  concurrency: 4
  timeout_secs: 300
  tripwire: true
  lock_file: true
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let stack_path = path.join("stack.yaml");
    if stack_path.exists() {
        return Err(format!("{} already exists", stack_path.display()));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    std::fs::write(&stack_path, EVENTS_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", stack_path.display(), e))?;

    println!("Initialized stackwright project at {}", path.display());
    println!("  Created: {}", stack_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_stack_file(file)?;
    let errors = parser::validate_stack(&config);

    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }

    // Cycles only show up once the graph is built
    let stack = parser::build_stack(&config).map_err(|e| e.to_string())?;
    let plan = stack.plan().map_err(|e| e.to_string())?;
    println!(
        "OK: {} ({} resources, {} levels)",
        config.name,
        config.resources.len(),
        plan.levels.len()
    );
    Ok(())
}

fn cmd_plan(file: &Path, state_dir: &Path, destroy: bool) -> Result<(), String> {
    let (_, stack) = parser::load_stack(file)?;

    if !destroy {
        let plan = stack.plan().map_err(|e| e.to_string())?;
        print_plan(&plan);
        return Ok(());
    }

    match state::load_lock(state_dir, stack.name())? {
        Some(lock) if !lock.resources.is_empty() => {
            let deployed = state::stack_from_lock(&lock).map_err(|e| e.to_string())?;
            let plan = deployed.teardown_plan().map_err(|e| e.to_string())?;
            print_plan(&plan);
        }
        _ => println!("No state for '{}'. Nothing to destroy.", stack.name()),
    }
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &types::ExecutionPlan) {
    println!(
        "Planning: {} ({} resources, {} levels)",
        plan.name,
        plan.resource_count(),
        plan.levels.len()
    );

    let mut current_level = None;
    for change in &plan.changes {
        if current_level != Some(change.level) {
            current_level = Some(change.level);
            println!();
            println!("level {}:", change.level);
        }
        let symbol = match change.action {
            types::PlanAction::Create => "+",
            types::PlanAction::Destroy => "-",
        };
        println!("  {} {}", symbol, change.description);
    }

    if !plan.edges.is_empty() {
        println!();
        println!("Edges:");
        for edge in &plan.edges {
            println!(
                "  {} -> {} ({})",
                edge.dependent, edge.dependency, edge.origin
            );
        }
    }

    let to_create = count_actions(plan, types::PlanAction::Create);
    let to_destroy = count_actions(plan, types::PlanAction::Destroy);
    println!();
    println!("Plan: {} to create, {} to destroy.", to_create, to_destroy);
}

fn count_actions(plan: &types::ExecutionPlan, action: types::PlanAction) -> usize {
    plan.changes.iter().filter(|c| c.action == action).count()
}

fn make_provider(run: &RunArgs) -> Result<Box<dyn Provisioner>, String> {
    match run.provider {
        ProviderKind::Simulated => Ok(Box::new(SimulatedProvisioner::new())),
        ProviderKind::Hook => {
            let program = run
                .hook
                .as_ref()
                .ok_or("--provider hook requires --hook <program>")?;
            Ok(Box::new(
                HookProvisioner::new(program).with_args(run.hook_args.iter().cloned()),
            ))
        }
    }
}

fn run_config<'a>(policy: &types::Policy, run: &'a RunArgs) -> ApplyConfig<'a> {
    let mut cfg = ApplyConfig::from_policy(policy).with_state_dir(&run.state_dir);
    if let Some(concurrency) = run.concurrency {
        cfg.concurrency = concurrency.max(1);
    }
    if let Some(secs) = run.timeout {
        cfg.timeout = std::time::Duration::from_secs(secs.max(1));
    }
    cfg
}

/// Write the lock for the live resources of `stack`, or remove it when
/// nothing is left.
fn persist_lock(state_dir: &Path, stack: &Stack) -> Result<(), String> {
    let lock = state::lock_from_stack(stack).map_err(|e| e.to_string())?;
    if lock.resources.is_empty() {
        state::remove_lock(state_dir, &lock.stack)
    } else {
        state::save_lock(state_dir, &lock)
    }
}

/// Fold a failed lock write into the run outcome. Live resources are
/// listed whenever the lock no longer records them.
fn with_lock_result(
    outcome: Result<(), String>,
    saved: Result<(), String>,
    stack: &Stack,
) -> Result<(), String> {
    let Err(lock_err) = saved else {
        return outcome;
    };
    match outcome {
        Ok(()) => {
            let live: Vec<String> = stack
                .live_resources()
                .iter()
                .map(|r| r.name.clone())
                .collect();
            print_survivors(&live);
            Err(format!("the state lock could not be written: {}", lock_err))
        }
        Err(e) => Err(format!(
            "{}; additionally the state lock could not be written: {}",
            e, lock_err
        )),
    }
}

fn print_survivors(survivors: &[String]) {
    if survivors.is_empty() {
        return;
    }
    eprintln!("Resources still present (manual cleanup may be required):");
    for name in survivors {
        eprintln!("  {}", name);
    }
}

async fn cmd_deploy(file: &Path, run: &RunArgs) -> Result<(), String> {
    let (config, mut stack) = parser::load_stack(file)?;

    if let Some(lock) = state::load_lock(&run.state_dir, stack.name())? {
        if !lock.resources.is_empty() {
            return Err(format!(
                "stack '{}' already has {} deployed resource(s); run `stackwright destroy` first",
                stack.name(),
                lock.resources.len()
            ));
        }
    }

    let plan = stack.plan().map_err(|e| e.to_string())?;
    print_plan(&plan);
    println!();

    let provider = make_provider(run)?;
    let cfg = run_config(&config.policy, run);
    let result = stack.apply(provider.as_ref(), &cfg).await;

    let touched_provider = !matches!(&result, Err(e) if e.is_plan_time());
    let saved = if config.policy.lock_file && touched_provider {
        persist_lock(&run.state_dir, &stack)
    } else {
        Ok(())
    };

    let outcome = match result {
        Ok(r) => {
            println!(
                "Deploy complete: {} created in {} level(s) ({:.1}s).",
                r.resources_created,
                r.levels,
                r.total_duration.as_secs_f64()
            );
            for resource in stack.live_resources() {
                for (attribute, value) in &resource.outputs {
                    println!(
                        "  {}.{} = {}",
                        resource.name,
                        attribute,
                        types::json_value_to_string(value)
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            print_survivors(&e.surviving_resources());
            Err(e.to_string())
        }
    };
    with_lock_result(outcome, saved, &stack)
}

async fn cmd_destroy(file: &Path, run: &RunArgs) -> Result<(), String> {
    // Only the name and policy come from the stack file; what gets deleted
    // comes from the lock.
    let config = parser::parse_stack_file(file)?;
    let lock = match state::load_lock(&run.state_dir, &config.name)? {
        Some(lock) if !lock.resources.is_empty() => lock,
        _ => {
            println!("No state for '{}'. Nothing to destroy.", config.name);
            return Ok(());
        }
    };

    let mut stack = state::stack_from_lock(&lock).map_err(|e| e.to_string())?;
    let plan = stack.teardown_plan().map_err(|e| e.to_string())?;
    print_plan(&plan);
    println!();

    let provider = make_provider(run)?;
    let cfg = run_config(&config.policy, run);
    let result = stack.destroy(provider.as_ref(), &cfg).await;
    let saved = persist_lock(&run.state_dir, &stack);

    let outcome = match result {
        Ok(r) => {
            println!(
                "Destroy complete: {} deleted ({:.1}s).",
                r.resources_deleted,
                r.total_duration.as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            print_survivors(&e.surviving_resources());
            Err(e.to_string())
        }
    };
    with_lock_result(outcome, saved, &stack)
}

fn cmd_status(state_dir: &Path) -> Result<(), String> {
    let locks = state::list_locks(state_dir)?;
    if locks.is_empty() {
        println!("No state found. Run `stackwright deploy` first.");
        return Ok(());
    }

    for lock in &locks {
        println!("Stack: {}", lock.stack);
        println!("  Generated: {}", lock.generated_at);
        println!("  Generator: {}", lock.generator);
        println!("  Digest:    {}", lock.digest);
        println!("  Resources: {}", lock.resources.len());
        for (id, rl) in &lock.resources {
            let applied = rl
                .applied_at
                .as_deref()
                .map(|t| format!(" at {}", t))
                .unwrap_or_default();
            println!(
                "    {}: {} [{}] level {}{}",
                id, rl.status, rl.kind, rl.level, applied
            );
        }
        println!();
    }
    Ok(())
}
