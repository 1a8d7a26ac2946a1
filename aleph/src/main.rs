use std::process;

use clap::Parser as ClapParser;
use log::info;

use aleph::{
    ObjectRef, Runtime, RuntimeCreateInfo, RuntimeError, RuntimeResult,
    SymbolId,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Entries per allocation pool block
    #[arg(long)]
    pool_capacity: Option<usize>,

    /// Bindings per environment
    #[arg(long)]
    env_capacity: Option<usize>,

    /// Live objects allowed before allocation fails
    #[arg(long)]
    object_limit: Option<usize>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level),
    )
    .init();

    let mut rt = match Runtime::new(RuntimeCreateInfo {
        pool_capacity: cli.pool_capacity,
        environment_capacity: cli.env_capacity,
        object_limit: cli.object_limit,
    }) {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Error initializing runtime: {err}");
            process::exit(1);
        }
    };

    if let Err(err) = run_session(&mut rt) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn print_value(rt: &Runtime, value: Option<ObjectRef>) {
    match value {
        Some(value) => println!("{}", rt.describe(value)),
        None => println!("<unset>"),
    }
}

fn run_session(rt: &mut Runtime) -> RuntimeResult<()> {
    let string = rt.mk_string("foo")?;
    rt.add_root(string);
    let vector = rt.alloc_real_vector(10)?;
    rt.add_root(vector);
    for (i, value) in rt.reals_mut(vector)?.iter_mut().enumerate() {
        *value = i as f64 / 2.0;
    }

    print_value(rt, rt.element(string, 0)?);
    print_value(rt, Some(vector));
    let names = rt.sym.names;
    print_value(rt, rt.get_attr(vector, names)?);
    print_value(rt, rt.get_attr(vector, SymbolId::CLASS)?);
    let class_symbol = rt.install("class")?;
    print_value(rt, Some(class_symbol));

    let statements = build_statements(rt)?;
    let env = rt.specials.global_env;
    for (source, expr) in statements {
        match rt.eval_toplevel(expr, env) {
            Ok(value) => println!("> {source}\n{}", rt.describe(value)),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => println!("> {source}\nError: {err}"),
        }
        for warning in rt.take_warnings() {
            println!("Warning: {warning}");
        }
    }

    println!("\nclasses:");
    for &class in rt.classes() {
        let descriptor = rt.class_data(class)?;
        let ancestors = rt
            .ancestors(class)?
            .iter()
            .skip(1)
            .map(|&c| rt.class_data(c).map(|d| d.name().to_owned()))
            .collect::<RuntimeResult<Vec<_>>>()?;
        println!(
            "  {:<16} tag {:>2}  attrs {}  <- {}",
            descriptor.name(),
            descriptor.type_tag(),
            descriptor.instance_attr_count(),
            ancestors.join(" <- ")
        );
    }

    let freed = rt.collect();
    let stats = rt.heap_stats();
    println!(
        "\nheap: {} live, {} allocated, {} freed ({freed} by the last \
         collection), {} promoted, {} collections",
        rt.live_objects(),
        stats.allocated,
        stats.freed,
        stats.promoted,
        stats.collections
    );
    Ok(())
}

/// Generic `kind` applied to a real: answers with a description.
fn kind_of_real(
    rt: &mut Runtime,
    args: ObjectRef,
    _env: ObjectRef,
) -> RuntimeResult<ObjectRef> {
    let values = rt.list_to_vec(args)?;
    let Some(&value) = values.first() else {
        return Err(RuntimeError::InvalidArgument("kind: no argument".into()));
    };
    let len = rt.length(value)?;
    rt.mk_string(&format!("real of length {len}"))
}

fn build_statements(
    rt: &mut Runtime,
) -> RuntimeResult<Vec<(&'static str, ObjectRef)>> {
    let s = rt.specials;
    let arrow = rt.install("<-")?;
    let x = rt.install("x")?;
    let n = rt.install("n")?;
    let kind = rt.install("kind")?;
    let missing = rt.install("undefined")?;

    let generic = rt.new_generic("kind")?;
    let kind_id = rt.symbol_id(kind)?;
    rt.assign(s.global_env, kind_id, generic)?;
    let builtin = rt.new_builtin(kind_of_real)?;
    rt.add_root(builtin);
    rt.define_method(s.real_class, "kind", &[], builtin)?;
    let label = rt.mk_string("an integer")?;
    rt.add_root(label);
    rt.define_method(s.integer_class, "kind", &[], label)?;
    info!("generic 'kind' defined for real and integer");

    // Every value is rooted as soon as it exists; any later allocation
    // may collect.
    let half = rt.scalar_real(0.5)?;
    rt.add_root(half);
    let three = rt.scalar_integer(3)?;
    rt.add_root(three);
    let text = rt.mk_string("text")?;
    rt.add_root(text);

    let calls: [(&'static str, &[ObjectRef]); 7] = [
        ("x <- 0.5", &[arrow, x, half]),
        ("n <- 3L", &[arrow, n, three]),
        ("x", &[x]),
        ("undefined", &[missing]),
        ("kind(x)", &[kind, x]),
        ("kind(n)", &[kind, n]),
        ("kind(\"text\")", &[kind, text]),
    ];
    let mut statements = Vec::with_capacity(calls.len());
    for (source, parts) in calls {
        // A lone symbol is evaluated as is.
        let expr = match parts {
            [symbol] => *symbol,
            _ => rt.lang(parts)?,
        };
        rt.add_root(expr);
        statements.push((source, expr));
    }
    Ok(statements)
}
