use std::cell::RefCell;
use std::rc::Rc;

pub type RcRc<A> = Rc<RefCell<A>>;

pub fn rcrc<A>(a: A) -> RcRc<A> {
    Rc::new(RefCell::new(a))
}

pub fn mk_string<A, I, F>(i: I, sep: &str, f: F) -> String
    where I: IntoIterator<Item=A>,
          F: FnMut(A) -> String
{
    i.into_iter().map(f).collect::<Vec<_>>().join(sep)
}

/// Formats a decimal the way the language displays it: integral values keep a trailing `.0`.
pub fn format_decimal(d: f64) -> String {
    if d.is_nan() {
        "nan".to_owned()
    } else if d.is_infinite() {
        if d > 0.0 { "inf".to_owned() } else { "-inf".to_owned() }
    } else {
        let s = d.to_string();
        if s.contains('.') || s.contains('e') { s } else { format!("{}.0", s) }
    }
}
