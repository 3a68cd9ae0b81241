use super::{describe, json_pretty, EXIT_SUCCESS};
use mirrors_core::Engine;
use mirrors_schema::Target;

pub fn run(
    engine: &Engine,
    distribution: &str,
    version: &str,
    arch: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let dist = engine
        .config()
        .distribution(distribution)
        .map_err(|e| format!("configuration error: {e}"))?;
    let mut target = Target::new(&dist.name, dist.kind, version);
    if let Some(arch) = arch {
        target = target.with_architecture(arch);
    }
    let plan = engine.plan(&target).map_err(|e| describe(&e))?;

    if json {
        let files: Vec<_> = plan
            .files
            .iter()
            .map(|f| serde_json::json!({ "path": f.path, "contents": f.contents }))
            .collect();
        let payload = serde_json::json!({
            "target": target.key(),
            "container": format!("linux-mirrors-{}", target.key().slug()),
            "tree": engine.layout().tree_path(&target),
            "files": files,
            "command": plan.command,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        if !dist.enabled {
            eprintln!("note: '{}' is disabled; sync would skip it", dist.name);
        }
        println!("tree: {}", engine.layout().tree_path(&target).display());
        print!("{plan}");
    }
    Ok(EXIT_SUCCESS)
}
