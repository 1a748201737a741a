use criterion::{Criterion, criterion_group, criterion_main};
use ocra::{Pattern, PatternGroup};

// From the JavaScript TextMate grammar
const PATTERNS: [&str; 10] = [
    r"(?<![$_[:alnum:]])(?:(?<=\.\.\.)|(?<!\.))abstract|declare|override|public|protected|private|readonly|static(?![$_[:alnum:]])(?:(?=\.\.\.)|(?!\.))",
    r"(?:(?<![$_[:alnum:]])(?:(?<=\.\.\.)|(?<!\.))\b(async)\s+)?([$_[:alpha:]][$_[:alnum:]]*)\s*(?==>)",
    r"(?<![$_[:alnum:]])(?:(?<=\.\.\.)|(?<!\.))async(?![$_[:alnum:]])(?:(?=\.\.\.)|(?!\.))",
    r"(?<![$_[:alnum:]])(?:(?<=\.\.\.)|(?<!\.))true(?![$_[:alnum:]])(?:(?=\.\.\.)|(?!\.))",
    r"(?<![$_[:alnum:]])(?:(?<=\.\.\.)|(?<!\.))false(?![$_[:alnum:]])(?:(?=\.\.\.)|(?!\.))",
    r"[$_[:alpha:]][$_[:alnum:]]*",
    r"([$_[:alpha:]][$_[:alnum:]]*)\s*(?:(\.)|(\?\.(?!\s*\d)))(?=\s*[$_[:alpha:]][$_[:alnum:]]*(\s*\??\.\s*[$_[:alpha:]][$_[:alnum:]]*)*\s*)",
    r"(?<![$_[:alnum:]])(?:(?<=\.\.\.)|(?<!\.))catch|finally|throw|try(?![$_[:alnum:]])(?:(?=\.\.\.)|(?!\.))",
    r"(?<![$_[:alnum:]])(?:(?<=\.\.\.)|(?<!\.))break|continue|goto\s+([$_[:alpha:]][$_[:alnum:]]*)(?![$_[:alnum:]])(?:(?=\.\.\.)|(?!\.))",
    r"(?<![$_[:alnum:]])(?:(?<=\.\.\.)|(?<!\.))break|continue|do|goto|while(?![$_[:alnum:]])(?:(?=\.\.\.)|(?!\.))",
];

const INPUT: &str = "async function test() { return true; }";

fn individual_patterns_benchmark(c: &mut Criterion) {
    let patterns: Vec<Pattern> = PATTERNS
        .iter()
        .map(|p| Pattern::compile(p).expect("Failed to compile pattern"))
        .collect();

    c.bench_function("individual patterns, leftmost match", |b| {
        b.iter(|| {
            let best = patterns
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.search(INPUT, 0).map(|m| (m.start, i)))
                .min();
            std::hint::black_box(best);
        })
    });
}

fn pattern_group_benchmark(c: &mut Criterion) {
    let group = PatternGroup::compile(&PATTERNS).expect("Failed to compile group");

    c.bench_function("pattern group, leftmost match", |b| {
        b.iter(|| {
            std::hint::black_box(group.search(INPUT, 0));
        })
    });

    c.bench_function("pattern group, compile", |b| {
        b.iter(|| {
            std::hint::black_box(PatternGroup::compile(&PATTERNS).expect("Failed to compile group"));
        })
    });
}

criterion_group!(benches, individual_patterns_benchmark, pattern_group_benchmark);
criterion_main!(benches);
