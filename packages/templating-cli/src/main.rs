/**
 * Aurelia Templating CLI - au-compile
 *
 * Compiles one template file and prints its instructions as JSON
 */
use std::path::Path;
use std::process;
use std::rc::Rc;

use anyhow::{Context, Result};
use aurelia_templating::binding::syntax::SyntaxBindingLanguage;
use aurelia_templating::loader::TemplateRegistryEntry;
use aurelia_templating::resources::Resource;
use aurelia_templating::{
    BehaviorBuilder, BindingContext, Container, Document, EngineConfig, ModelType, ObjectContext,
    TemplateSource, ViewCompileInstruction, ViewCompiler, ViewResources,
};
use clap::{Arg, ArgAction, Command};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

/// What to compile and which resources to pretend are registered
#[derive(Debug, Default)]
struct Options {
    surrogate: bool,
    shadow_dom: bool,
    elements: Vec<String>,
    attributes: Vec<String>,
    controllers: Vec<String>,
    config: EngineConfig,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("au-compile")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compile a template and print its instructions")
        .arg(
            Arg::new("template")
                .value_name("FILE")
                .required(true)
                .help("Template file whose root is a <template> element"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Engine configuration (JSON)"),
        )
        .arg(
            Arg::new("surrogate")
                .long("surrogate")
                .action(ArgAction::SetTrue)
                .help("Compile <template> attributes as a custom element surrogate"),
        )
        .arg(
            Arg::new("shadow-dom")
                .long("shadow-dom")
                .action(ArgAction::SetTrue)
                .help("Leave <content> elements uncompiled"),
        )
        .arg(
            Arg::new("element")
                .short('e')
                .long("element")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Treat NAME as a registered custom element"),
        )
        .arg(
            Arg::new("attribute")
                .short('a')
                .long("attribute")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Treat NAME as a registered custom attribute"),
        )
        .arg(
            Arg::new("controller")
                .short('t')
                .long("controller")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Treat NAME as a registered template controller"),
        )
        .get_matches();

    let names = |id: &str| -> Vec<String> {
        matches
            .get_many::<String>(id)
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };

    let template = matches
        .get_one::<String>("template")
        .cloned()
        .unwrap_or_default();

    let result = load_config(matches.get_one::<String>("config").map(String::as_str)).and_then(|config| {
        let options = Options {
            surrogate: matches.get_flag("surrogate"),
            shadow_dom: matches.get_flag("shadow-dom"),
            elements: names("element"),
            attributes: names("attribute"),
            controllers: names("controller"),
            config,
        };
        compile_file(Path::new(&template), &options)
    });

    match result {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(err) => {
                eprintln!("Error: {}", err);
                process::exit(1);
            }
        },
        Err(err) => {
            eprintln!("Error: {:#}", err);
            process::exit(1);
        }
    }
}

fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let source = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
    EngineConfig::from_json(&source).with_context(|| format!("parsing config {}", path))
}

fn compile_file(path: &Path, options: &Options) -> Result<Value> {
    let markup = std::fs::read_to_string(path)
        .with_context(|| format!("reading template {}", path.display()))?;
    compile_markup(&path.to_string_lossy(), &markup, options)
}

fn stub_model(name: &str) -> ModelType {
    ModelType::new(name, |_| ObjectContext::empty() as BindingContext)
}

/// Registry holding placeholder behaviors for every name on the command line
fn stub_resources(container: &Rc<Container>, address: &str, options: &Options) -> Result<Rc<ViewResources>> {
    let resources = ViewResources::new(None, Some(address));
    let builders = options
        .elements
        .iter()
        .map(|name| BehaviorBuilder::new().element(name))
        .chain(options.attributes.iter().map(|name| BehaviorBuilder::new().attribute(name)))
        .chain(
            options
                .controllers
                .iter()
                .map(|name| BehaviorBuilder::new().attribute(name).template_controller()),
        );

    for builder in builders {
        let name = builder
            .element_name()
            .or(builder.attribute_name())
            .unwrap_or_default()
            .to_string();
        let behavior = builder
            .build(container, stub_model(&name))
            .with_context(|| format!("registering {}", name))?;
        behavior.register(&resources, None)?;
    }
    Ok(resources)
}

fn compile_markup(address: &str, markup: &str, options: &Options) -> Result<Value> {
    let document = Document::new();
    let container = Container::new();
    let resources = stub_resources(&container, address, options)?;

    let entry = TemplateRegistryEntry::new(document.clone(), address);
    entry.set_template(document.create_template_from_markup(markup)?)?;
    let dependencies: Vec<Value> = entry
        .dependencies()
        .into_iter()
        .map(|dependency| json!({ "from": dependency.src, "as": dependency.name }))
        .collect();
    if !dependencies.is_empty() {
        tracing::warn!(
            count = dependencies.len(),
            "required resources are listed but not loaded"
        );
    }

    let template = entry
        .template()
        .with_context(|| format!("no template in {}", address))?;
    let compiler = ViewCompiler::new(
        document.clone(),
        Rc::new(SyntaxBindingLanguage::new()),
        resources.clone(),
    );
    let instruction = ViewCompileInstruction::new(
        options.shadow_dom,
        options.surrogate && options.config.compile_surrogates,
    );
    let factory = compiler.compile(TemplateSource::Node(template), Some(&resources), &instruction)?;
    if options.config.default_cache_size.is_some() {
        factory.set_cache_size(options.config.default_cache_size, true);
    }
    tracing::debug!(address, "compiled template");

    Ok(json!({
        "address": address,
        "dependencies": dependencies,
        "factory": factory.describe(),
    }))
}
