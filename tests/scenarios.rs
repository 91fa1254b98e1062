//! End-to-end rendering scenarios

use pretty_assertions::assert_eq;
use qscript::{
    render_template, render_text, scan, tokens, Bindings, Error, FieldKind, FieldSpec,
    RenderConfig, ScanError, Schema, Template, Violation,
};

const JOB: &str = "#COBALT -n $${nnodes}\ncd $${launch_dir}\n";

fn job_template() -> Template {
    Template::builder("job", JOB)
        .directive_prefix("#COBALT")
        .schema(
            Schema::new()
                .with_field("nnodes", FieldSpec::new(FieldKind::Integer))
                .with_field("launch_dir", FieldSpec::new(FieldKind::Path)),
        )
        .build()
        .expect("Should build")
}

fn violations(err: Error) -> Vec<Violation> {
    match err {
        Error::Validation(report) => report.violations().to_vec(),
        other => panic!("Expected a validation failure, got {:?}", other),
    }
}

#[test]
fn test_renders_directives_and_body() {
    let bindings = Bindings::new()
        .with("nnodes", "4")
        .with("launch_dir", "/home/x");
    let script = render_template(&job_template(), &bindings, &RenderConfig::default())
        .expect("Should render");
    assert_eq!(script.text(), "#COBALT -n 4\ncd /home/x\n");
}

#[test]
fn test_missing_binding_is_reported_alone() {
    let bindings = Bindings::new().with("launch_dir", "/home/x");
    let err = render_template(&job_template(), &bindings, &RenderConfig::default()).unwrap_err();
    assert_eq!(violations(err), vec![Violation::missing("nnodes")]);
}

#[test]
fn test_negative_node_count_is_invalid() {
    let bindings = Bindings::new()
        .with("nnodes", "-1")
        .with("launch_dir", "/home/x");
    let err = render_template(&job_template(), &bindings, &RenderConfig::default()).unwrap_err();
    assert_eq!(
        violations(err),
        vec![Violation::invalid("nnodes", "positive integer")]
    );
}

#[test]
fn test_unbalanced_placeholder_offset() {
    let err = scan("#COBALT -n $${nnodes\n").unwrap_err();
    assert_eq!(err.offset(), 11);
    assert!(matches!(err, ScanError::MalformedToken { .. }));

    let err = render_text("t", "#COBALT -n $${nnodes\n", &Bindings::new(), &RenderConfig::default())
        .unwrap_err();
    match err {
        Error::Scan(scan_err) => assert_eq!(scan_err.offset(), 11),
        other => panic!("Expected Scan, got {:?}", other),
    }
}

#[test]
fn test_all_violations_are_collected() {
    let bindings = Bindings::new()
        .with("nnodes", "zero")
        .with("queue", "debug")
        .with("account", "x");
    let err = render_template(&job_template(), &bindings, &RenderConfig::default()).unwrap_err();
    assert_eq!(
        violations(err),
        vec![
            Violation::invalid("nnodes", "positive integer"),
            Violation::missing("launch_dir"),
            Violation::unknown("account"),
            Violation::unknown("queue"),
        ]
    );
}

#[test]
fn test_lenient_mode_ignores_unknown_bindings() {
    let bindings = Bindings::new()
        .with("nnodes", "4")
        .with("launch_dir", "/home/x")
        .with("queue", "debug");
    let script = render_template(&job_template(), &bindings, &RenderConfig::new().lenient())
        .expect("Should render");
    assert_eq!(script.text(), "#COBALT -n 4\ncd /home/x\n");
    assert!(!script.bindings().contains("queue"));
}

#[test]
fn test_output_never_contains_placeholders() {
    let templates = [
        "$${a}$${b}$${a}",
        "$$ and $ and $${a}\n",
        "#PBS -N $${a}\n#PBS -o $${b}.out\n\n$${b}",
    ];
    let bindings = Bindings::new().with("a", "job").with("b", "/scratch/out");

    for text in templates {
        let script = render_text("t", text, &bindings, &RenderConfig::new().lenient())
            .expect("Should render");
        assert!(!script.text().contains("$${"), "{:?}", script.text());
        assert!(tokens(script.text()).next().is_none());
    }
}

#[test]
fn test_values_containing_sentinel_are_rejected() {
    let bindings = Bindings::new().with("a", "$${b}").with("b", "${a}");
    let err = render_text("t", "$${a}$${b}$${a}", &bindings, &RenderConfig::default())
        .unwrap_err();
    assert_eq!(
        violations(err),
        vec![Violation::invalid("a", "no placeholder sentinel")]
    );
}

#[test]
fn test_dollar_values_are_substituted_literally() {
    let bindings = Bindings::new().with("a", "${HOME}").with("b", "$$");
    let script = render_text("t", "$${a} $${b}\n", &bindings, &RenderConfig::default())
        .expect("Should render");
    assert_eq!(script.text(), "${HOME} $$\n");
    assert!(tokens(script.text()).next().is_none());
}

#[test]
fn test_rescanning_plain_output_finds_nothing() {
    let bindings = Bindings::new()
        .with("nnodes", "16")
        .with("launch_dir", "/lus/project/run");
    let script = render_template(&job_template(), &bindings, &RenderConfig::default())
        .expect("Should render");
    assert_eq!(scan(script.text()).expect("Should scan"), vec![]);
}

#[test]
fn test_identical_inputs_hash_identically() {
    let bindings = Bindings::new()
        .with("nnodes", "4")
        .with("launch_dir", "/home/x");
    let first = render_template(&job_template(), &bindings, &RenderConfig::default())
        .expect("Should render");
    let second = render_template(&job_template(), &bindings, &RenderConfig::default())
        .expect("Should render");
    assert_eq!(first.content_hash(), second.content_hash());

    let other = render_template(
        &job_template(),
        &bindings.clone().with("nnodes", "8"),
        &RenderConfig::default(),
    )
    .expect("Should render");
    assert_ne!(first.content_hash(), other.content_hash());
}

#[test]
fn test_walltime_rules() {
    let template = Template::builder("t", "#SBATCH --time=$${walltime}\n")
        .schema(Schema::new().with_field("walltime", FieldSpec::new(FieldKind::Duration)))
        .build()
        .expect("Should build");

    for good in ["00:00:00", "01:30:00", "100:59:59"] {
        let bindings = Bindings::new().with("walltime", good);
        let script = render_template(&template, &bindings, &RenderConfig::default())
            .expect("Should render");
        assert_eq!(script.text(), format!("#SBATCH --time={}\n", good));
    }

    for bad in ["1:60:00", "01:00:60", "01:00", "1h", "01:0:00", ""] {
        let bindings = Bindings::new().with("walltime", bad);
        let err = render_template(&template, &bindings, &RenderConfig::default()).unwrap_err();
        assert_eq!(
            violations(err),
            vec![Violation::invalid("walltime", "HH:MM:SS")],
            "walltime {:?}",
            bad
        );
    }
}

#[test]
fn test_multiline_value_rejected_on_directive_line() {
    let template = Template::builder("t", "#BSUB -J $${name}\necho $${body}\n")
        .directive_prefix("#BSUB")
        .build()
        .expect("Should build");
    let bindings = Bindings::new()
        .with("name", "a\n#BSUB -q priority")
        .with("body", "one\ntwo");

    let err = render_template(&template, &bindings, &RenderConfig::default()).unwrap_err();
    assert_eq!(
        violations(err),
        vec![Violation::invalid("name", "single-line value")]
    );
}
