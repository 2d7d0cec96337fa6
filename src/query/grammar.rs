//! chumsky grammar for the `filter=` function syntax, e.g. `and(equals(title,'x'),has(comments))`.

use crate::query::raw::{RawFilter, RawLiteral};
use crate::query::ComparisonOperator;
use chumsky::extra;
use chumsky::prelude::*;

/// Rich errors carry positions and expected tokens into the error message.
pub(crate) type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Deepest parenthesis nesting accepted in one expression.
pub(crate) const MAX_FILTER_DEPTH: usize = 32;

/// One function argument before the function's shape is checked.
#[derive(Clone, Debug)]
enum Arg {
    Filter(RawFilter),
    Quoted(String),
    /// Field path or the `null` keyword.
    Bare(String),
}

/// Field paths, function names and `null`.
fn bare<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("name")
}

/// `'text'` with `''` standing for one quote.
fn quoted<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('\'')
        .ignore_then(
            choice((just("''").to('\''), none_of("'")))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('\''))
        .labelled("quoted value")
}

fn filter<'src>() -> impl Parser<'src, &'src str, RawFilter, Extra<'src>> + Clone {
    recursive(|filter| {
        let arg = choice((
            filter.map(Arg::Filter),
            quoted().map(Arg::Quoted),
            bare().map(Arg::Bare),
        ))
        .padded();
        let args = arg
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .delimited_by(just('('), just(')'));
        bare()
            .then(args)
            .try_map(|(name, args), span| function(&name, args).map_err(|m| Rich::custom(span, m)))
            .labelled("filter function")
    })
}

/// Parse a whole expression; errors come back as one readable line.
pub(crate) fn parse_filter(input: &str) -> Result<RawFilter, String> {
    if input.trim().is_empty() {
        return Err("empty filter expression".to_string());
    }
    if nesting_depth(input) > MAX_FILTER_DEPTH {
        return Err(format!("filter expression nests deeper than {} levels", MAX_FILTER_DEPTH));
    }
    filter()
        .padded()
        .then_ignore(end())
        .parse(input)
        .into_result()
        .map_err(|errs| format_errors(&errs))
}

/// Deepest `(` nesting outside quoted text.
fn nesting_depth(input: &str) -> usize {
    let (mut depth, mut deepest, mut in_quote) = (0usize, 0usize, false);
    for c in input.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ')' if !in_quote => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn format_errors(errs: &[Rich<'_, char>]) -> String {
    errs.iter()
        .map(|e| {
            let found = e.found().map_or("end of input".to_string(), |c| format!("'{}'", c));
            format!("{} at position {} (found {})", e.reason(), e.span().start, found)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check a function's argument shape and build the raw filter.
fn function(name: &str, args: Vec<Arg>) -> Result<RawFilter, String> {
    let op = match name {
        "equals" => Some(ComparisonOperator::Equals),
        "lessThan" => Some(ComparisonOperator::LessThan),
        "lessOrEqual" => Some(ComparisonOperator::LessOrEqual),
        "greaterThan" => Some(ComparisonOperator::GreaterThan),
        "greaterOrEqual" => Some(ComparisonOperator::GreaterOrEqual),
        "contains" => Some(ComparisonOperator::Contains),
        "startsWith" => Some(ComparisonOperator::StartsWith),
        "endsWith" => Some(ComparisonOperator::EndsWith),
        _ => None,
    };
    if let Some(op) = op {
        return comparison(name, op, args);
    }
    let mut args = args.into_iter();
    match name {
        "any" => {
            let path = field(name, args.next())?;
            let values = args
                .map(|a| match a {
                    Arg::Quoted(v) => Ok(v),
                    _ => Err("any() takes quoted values after the field".to_string()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            if values.is_empty() {
                return Err("any() requires at least one value".to_string());
            }
            Ok(RawFilter::Any { path, values })
        }
        "has" => {
            let path = field(name, args.next())?;
            let filter = match args.next() {
                None => None,
                Some(Arg::Filter(f)) => Some(Box::new(f)),
                Some(_) => return Err("has() takes a filter function as its second argument".to_string()),
            };
            if args.next().is_some() {
                return Err("has() takes at most two arguments".to_string());
            }
            Ok(RawFilter::Has { path, filter })
        }
        "not" => match (args.next(), args.next()) {
            (Some(Arg::Filter(f)), None) => Ok(RawFilter::Not(Box::new(f))),
            _ => Err("not() takes exactly one filter function".to_string()),
        },
        "and" | "or" => {
            let terms = args
                .map(|a| match a {
                    Arg::Filter(f) => Ok(f),
                    _ => Err(format!("{}() takes filter functions only", name)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            if terms.len() < 2 {
                return Err(format!("{}() requires at least two operands", name));
            }
            Ok(if name == "and" {
                RawFilter::And(terms)
            } else {
                RawFilter::Or(terms)
            })
        }
        other => Err(format!("unknown filter function '{}'", other)),
    }
}

fn comparison(name: &str, op: ComparisonOperator, args: Vec<Arg>) -> Result<RawFilter, String> {
    let mut args = args.into_iter();
    let path = field(name, args.next())?;
    let value = match args.next() {
        Some(Arg::Quoted(v)) => RawLiteral::Text(v),
        Some(Arg::Bare(k)) if k == "null" => {
            if op != ComparisonOperator::Equals {
                return Err("null is only allowed with equals()".to_string());
            }
            RawLiteral::Null
        }
        _ => return Err(format!("{}() takes a field and a quoted value or null", name)),
    };
    if args.next().is_some() {
        return Err(format!("{}() takes exactly two arguments", name));
    }
    Ok(RawFilter::Compare { path, op, value })
}

fn field(name: &str, arg: Option<Arg>) -> Result<Vec<String>, String> {
    match arg {
        Some(Arg::Bare(text)) if text != "null" => {
            let segments: Vec<String> = text.split('.').map(str::to_string).collect();
            if segments.iter().any(String::is_empty) {
                return Err(format!("empty segment in field path '{}'", text));
            }
            Ok(segments)
        }
        _ => Err(format!("{}() expects a field name first", name)),
    }
}
