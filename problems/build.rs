//! Generates the `Problem` enumeration from `resources/problem-codes.csv`.
use std::{
    collections::HashSet,
    env,
    error::Error,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    process,
};

/// One row of the problem table.
struct ProblemDef {
    /// Stable code such as `P0101`. Codes never change meaning between releases.
    code: String,
    /// Variant name in the generated enum.
    name: String,
    message: String,
}

fn read_definitions(path: &Path) -> Result<Vec<ProblemDef>, Box<dyn Error>> {
    let src = fs::read_to_string(path)
        .map_err(|e| format!("Unable to read '{}': {}", path.display(), e))?;

    let mut defs = Vec::new();
    let mut codes = HashSet::new();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(src.as_bytes());

    for (index, result) in rdr.records().enumerate() {
        let record = result?;
        let field = |column: usize| {
            record
                .get(column)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| format!("Row {} has no value in column {}", index + 2, column))
        };
        let def = ProblemDef {
            code: field(0)?,
            name: field(1)?,
            message: field(2)?,
        };

        if !def.name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("'{}' is not a valid variant name", def.name).into());
        }
        if !codes.insert(def.code.clone()) {
            return Err(format!("Code {} is defined more than once", def.code).into());
        }
        defs.push(def);
    }

    Ok(defs)
}

fn generate(defs: &[ProblemDef]) -> Result<String, std::fmt::Error> {
    let mut out = String::new();

    writeln!(out, "/// A problem that the engine can report.")?;
    writeln!(out, "#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]")?;
    writeln!(out, "pub enum Problem {{")?;
    for def in defs {
        writeln!(out, "    /// {}", def.message)?;
        writeln!(out, "    {},", def.name)?;
    }
    writeln!(out, "}}\n")?;

    writeln!(out, "impl Problem {{")?;
    writeln!(out, "    /// Every problem in code order.")?;
    writeln!(out, "    pub const ALL: &'static [Problem] = &[")?;
    for def in defs {
        writeln!(out, "        Problem::{},", def.name)?;
    }
    writeln!(out, "    ];\n")?;

    writeln!(out, "    /// Returns the stable code for the problem.")?;
    writeln!(out, "    pub fn code(&self) -> &'static str {{")?;
    writeln!(out, "        match self {{")?;
    for def in defs {
        writeln!(out, "            Problem::{} => {:?},", def.name, def.code)?;
    }
    writeln!(out, "        }}\n    }}\n")?;

    writeln!(out, "    /// Returns the message for the problem. The message does not")?;
    writeln!(out, "    /// depend on where the problem occurred.")?;
    writeln!(out, "    pub fn message(&self) -> &'static str {{")?;
    writeln!(out, "        match self {{")?;
    for def in defs {
        writeln!(out, "            Problem::{} => {:?},", def.name, def.message)?;
    }
    writeln!(out, "        }}\n    }}")?;
    writeln!(out, "}}\n")?;

    writeln!(out, "impl std::fmt::Display for Problem {{")?;
    writeln!(
        out,
        "    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {{"
    )?;
    writeln!(out, "        write!(f, \"{{}}: {{}}\", self.code(), self.message())")?;
    writeln!(out, "    }}\n}}")?;

    Ok(out)
}

fn create_problems() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=resources/problem-codes.csv");

    let mut src_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    src_path.push("resources");
    src_path.push("problem-codes.csv");

    let defs = read_definitions(&src_path)?;
    let code = generate(&defs)?;

    let mut out_path = PathBuf::from(env::var("OUT_DIR")?);
    out_path.push("problems.rs");
    fs::write(&out_path, code)
        .map_err(|e| format!("Unable to write '{}': {}", out_path.display(), e))?;

    Ok(())
}

fn main() {
    if let Err(err) = create_problems() {
        println!("problem generating problems.rs: {}", err);
        process::exit(1);
    }
}
