use std::fs;
use std::path::Path;
use std::time::Instant;

use log::{info, warn};

use sieve_compiler::{CompileStats, Compiler, Diagnostic};
use sieve_core::{Engine, EngineConfig};

/// One compiled input list.
pub struct CompiledInput {
    pub name: String,
    pub text: String,
    pub stats: CompileStats,
    pub diagnostics: Vec<Diagnostic>,
}

/// List name used in compiled output: the file stem.
pub fn list_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

pub fn compile_inputs(inputs: &[String], compiler: &Compiler, verbose: bool) -> Result<Vec<CompiledInput>, String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let mut out = Vec::with_capacity(inputs.len());
    for (list_id, path) in inputs.iter().enumerate() {
        let content = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let name = list_name(path);

        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let compiled = compiler.compile_list(&content, &name, &mut diagnostics);

        if verbose {
            println!(
                "  [{}] {} - {} lines, {} accepted, {} rejected",
                list_id, name, compiled.stats.lines, compiled.stats.accepted, compiled.stats.rejected
            );
            for diagnostic in &diagnostics {
                println!("      {}", diagnostic);
            }
        }

        out.push(CompiledInput {
            name,
            text: compiled.text,
            stats: compiled.stats,
            diagnostics,
        });
    }
    Ok(out)
}

/// Load compiled lists into a fresh engine, then freeze and optimize it.
pub fn build_engine(lists: &[CompiledInput], config: EngineConfig) -> Result<Engine, String> {
    let start = Instant::now();
    let mut engine = Engine::new(config);
    for list in lists {
        let stats = engine
            .load_compiled(&list.text)
            .map_err(|e| format!("Failed to load '{}': {}", list.name, e))?;
        info!(
            "loaded '{}': {} network, {} hostnames, {} duplicates",
            stats.name, stats.network, stats.hostnames, stats.duplicates
        );
    }
    engine.optimize();
    info!("engine built in {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
    Ok(engine)
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
        }
    }
    fs::write(path, bytes).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    Ok(())
}

pub fn read_selfie(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))
}

pub fn load_engine(path: &Path, config: EngineConfig) -> Result<Engine, String> {
    let bytes = read_selfie(path)?;
    Engine::deserialize(&bytes, config).map_err(|e| {
        warn!("selfie '{}' rejected: {}", path.display(), e);
        format!("Invalid selfie '{}': {} (recompile the lists)", path.display(), e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_names_are_file_stems() {
        assert_eq!(list_name("lists/easylist.txt"), "easylist");
        assert_eq!(list_name("hosts"), "hosts");
    }

    #[test]
    fn compiled_inputs_build_a_frozen_engine() {
        let dir = std::env::temp_dir().join(format!("sieve-cli-test-{}", std::process::id()));
        let list = dir.join("mini.txt");
        write_bytes(&list, b"||ads.example.com^\n###%%%broken\n/banner/ad.gif\n").unwrap();

        let inputs = vec![list.to_string_lossy().into_owned()];
        let compiled = compile_inputs(&inputs, &Compiler::default(), false).unwrap();
        assert_eq!(compiled[0].name, "mini");
        assert_eq!(compiled[0].stats.accepted, 2);
        assert_eq!(compiled[0].diagnostics.len(), 1);

        let engine = build_engine(&compiled, EngineConfig::default()).unwrap();
        assert!(engine.is_frozen());

        let selfie = dir.join("mini.selfie");
        write_bytes(&selfie, &engine.serialize()).unwrap();
        let restored = load_engine(&selfie, EngineConfig::default()).unwrap();
        assert_eq!(restored.lists(), engine.lists());

        let _ = fs::remove_dir_all(&dir);
    }
}
