//! Integration tests for the engine contract as implemented by the reference
//! engine: handle issue and reuse, representation bridging, and the
//! expression language

use tether_engine::{Engine, EngineError, Kernel, Operand, ReferenceEngine, ReprPolicy, Representation, Shape};

fn engine() -> ReferenceEngine {
    tether_tracing::init_test_tracing();
    ReferenceEngine::new()
}

fn load(engine: &mut ReferenceEngine, shape: Shape, data: &[f64]) -> tether_engine::Result<tether_engine::Handle> {
    let representation = ReprPolicy::default().select(shape.element_count());
    let handle = engine.alloc(shape, representation)?;
    engine.copy_in(handle, data)?;
    Ok(handle)
}

fn read_all(engine: &ReferenceEngine, handle: tether_engine::Handle) -> tether_engine::Result<Vec<f64>> {
    let mut out = vec![0.0; engine.shape(handle)?.physical_len()];
    engine.copy_out(handle, &mut out)?;
    Ok(out)
}

#[test]
fn test_handles_start_at_one_and_are_reused() -> tether_engine::Result<()> {
    let mut engine = engine();
    let a = engine.alloc(Shape::Scalar, Representation::Slow)?;
    let b = engine.alloc(Shape::Scalar, Representation::Slow)?;
    assert_eq!(a.id(), 1);
    assert_eq!(b.id(), 2);

    engine.free(a);
    let c = engine.alloc(Shape::Vector(4), Representation::Fast)?;
    assert_eq!(c, a);
    assert_eq!(engine.shape(c)?, Shape::Vector(4));
    assert_eq!(engine.live_count(), 2);
    Ok(())
}

#[test]
fn test_alloc_is_zero_filled() -> tether_engine::Result<()> {
    let mut engine = engine();
    for representation in [Representation::Fast, Representation::Slow] {
        let handle = engine.alloc(Shape::Complex(3), representation)?;
        assert_eq!(read_all(&engine, handle)?, vec![0.0; 6]);
    }
    Ok(())
}

#[test]
fn test_copy_length_is_checked() {
    let mut engine = engine();
    let handle = engine.alloc(Shape::Vector(3), Representation::Slow).unwrap();
    assert!(matches!(engine.copy_in(handle, &[1.0]), Err(EngineError::DimensionMismatch { .. })));

    let mut out = [0.0; 2];
    assert!(matches!(engine.copy_out(handle, &mut out), Err(EngineError::DimensionMismatch { .. })));
}

#[test]
fn test_fast_and_slow_paths_agree() -> tether_engine::Result<()> {
    let data: Vec<f64> = (0..12).map(|i| (i as f64 - 5.5) / 3.0).collect();
    let kernels = ["sin", "exp", "abs", "round", "fft_mag", "fftshift", "sum", "norm"];

    for name in kernels {
        let kernel = Kernel::from_name(name).expect("known kernel");
        let mut results = Vec::new();
        for representation in [Representation::Fast, Representation::Slow] {
            let mut engine = engine();
            let handle = engine.alloc(Shape::Vector(data.len()), representation)?;
            engine.copy_in(handle, &data)?;
            let out = engine.invoke(kernel, &[Operand::Handle(handle)], ReprPolicy::default())?;
            results.push(read_all(&engine, out)?);
        }
        let (fast, slow) = (&results[0], &results[1]);
        assert_eq!(fast.len(), slow.len(), "{name}");
        for (x, y) in fast.iter().zip(slow) {
            assert!((x - y).abs() < 1e-9, "{name}: {x} vs {y}");
        }
    }
    Ok(())
}

#[test]
fn test_representations_agree_on_result_shapes() -> tether_engine::Result<()> {
    let cases: Vec<(Shape, Vec<f64>, &str)> = vec![
        (Shape::Matrix { rows: 0, cols: 3 }, vec![], "transpose"),
        (Shape::Matrix { rows: 0, cols: 3 }, vec![], "add"),
        (Shape::Matrix { rows: 2, cols: 3 }, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], "transpose"),
        (Shape::Matrix { rows: 2, cols: 2 }, vec![1.0, -2.0, 3.0, -4.0], "neg"),
        (Shape::Complex(0), vec![], "add"),
        (Shape::Complex(0), vec![], "fft"),
        (Shape::Complex(1), vec![3.0, 4.0], "mul"),
        (Shape::Complex(2), vec![1.0, 2.0, -3.0, 0.5], "mul"),
        (Shape::Vector(0), vec![], "fft_mag"),
    ];

    for (shape, data, name) in cases {
        let kernel = Kernel::from_name(name).expect("known kernel");
        let mut outcomes = Vec::new();
        for threshold in [0, 8] {
            let policy = ReprPolicy::new(threshold);
            let mut engine = engine();
            let handle = engine.alloc(shape, policy.select(shape.element_count()))?;
            engine.copy_in(handle, &data)?;
            let operands = vec![Operand::Handle(handle); kernel.arity()];
            let out = engine.invoke(kernel, &operands, policy)?;
            outcomes.push((engine.shape(out)?, read_all(&engine, out)?));
        }
        assert_eq!(outcomes[0], outcomes[1], "{name} on {shape}");
    }
    Ok(())
}

#[test]
fn test_invoke_leaves_operands_untouched() -> tether_engine::Result<()> {
    let mut engine = engine();
    let a = load(&mut engine, Shape::Vector(2), &[1.0, 2.0])?;
    let b = load(&mut engine, Shape::Vector(2), &[3.0, 4.0])?;
    let sum = engine.invoke(Kernel::from_name("add").expect("add"), &[a.into(), b.into()], ReprPolicy::default())?;

    assert_eq!(read_all(&engine, sum)?, vec![4.0, 6.0]);
    assert_eq!(read_all(&engine, a)?, vec![1.0, 2.0]);
    assert_eq!(read_all(&engine, b)?, vec![3.0, 4.0]);
    Ok(())
}

#[test]
fn test_invalid_handles() {
    let mut engine = engine();
    let ghost = tether_engine::Handle::new(99);
    assert_eq!(engine.shape(ghost).unwrap_err(), EngineError::InvalidHandle(ghost));
    assert!(engine.eval("$99 + 1", ReprPolicy::default()).is_err());
    engine.free(ghost);
}

#[test]
fn test_eval_language() -> tether_engine::Result<()> {
    let mut engine = engine();
    let v = load(&mut engine, Shape::Vector(5), &[5.0, -1.0, 3.0, 0.0, 2.0])?;

    let cases: &[(String, Vec<f64>)] = &[
        (format!("{v} * 2 + 1"), vec![11.0, -1.0, 7.0, 1.0, 5.0]),
        (format!("filter(x => x >= 2, {v})"), vec![5.0, 3.0, 2.0]),
        (format!("map((x, y) => x - y, {v}, [1, 1, 1])"), vec![4.0, -2.0, 2.0]),
        (format!("reduce((a, x) => max(a, x), -inf, {v})"), vec![5.0]),
        ("2 ^ 3 ^ 2".to_string(), vec![512.0]),
        ("pipe([1, 4, 9], sqrt, sum)".to_string(), vec![6.0]),
    ];

    for (text, expected) in cases {
        let handle = engine.eval(text, ReprPolicy::default())?;
        assert_eq!(&read_all(&engine, handle)?, expected, "{text}");
    }
    Ok(())
}

#[test]
fn test_eval_errors() {
    let mut engine = engine();
    assert!(matches!(engine.eval("[1, 2", ReprPolicy::default()), Err(EngineError::Parse { .. })));
    assert!(matches!(
        engine.eval("frobnicate(1)", ReprPolicy::default()),
        Err(EngineError::UnknownFunction(_))
    ));
    assert!(matches!(
        engine.eval("[1, 2] + [1, 2, 3]", ReprPolicy::default()),
        Err(EngineError::DimensionMismatch { .. })
    ));
    assert_eq!(engine.live_count(), 0);
}

#[test]
fn test_allocation_limit() {
    let mut engine = ReferenceEngine::with_limit(1);
    let a = engine.alloc(Shape::Scalar, Representation::Slow).unwrap();
    assert!(matches!(
        engine.alloc(Shape::Scalar, Representation::Slow),
        Err(EngineError::AllocationFailed(_))
    ));
    engine.free(a);
    assert!(engine.alloc(Shape::Scalar, Representation::Slow).is_ok());
}

#[test]
fn test_bindings_and_let_persist_between_evals() -> tether_engine::Result<()> {
    let mut engine = engine();
    let samples = load(&mut engine, Shape::Matrix { rows: 2, cols: 2 }, &[1.0, 2.0, 3.0, 4.0])?;
    engine.bind("m", samples)?;

    let first = engine.eval("let offset = 0.5; map(x => x + offset, m)", ReprPolicy::default())?;
    assert_eq!(engine.shape(first)?, Shape::Matrix { rows: 2, cols: 2 });
    assert_eq!(read_all(&engine, first)?, vec![1.5, 2.5, 3.5, 4.5]);

    let second = engine.eval("sum(m) * offset", ReprPolicy::default())?;
    assert_eq!(read_all(&engine, second)?, vec![5.0]);

    engine.reset_bindings();
    assert!(matches!(
        engine.eval("offset", ReprPolicy::default()),
        Err(EngineError::InvalidArgument(_))
    ));
    Ok(())
}
