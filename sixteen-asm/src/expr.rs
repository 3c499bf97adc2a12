//! Bracketed arithmetic expressions.
//!
//! The parser collects `[ a op b op ( c op d ) ... ]` as a flat [`Sequence`]. Turning it
//! into a tree repeatedly picks the highest-priority operator (leftmost on ties) and
//! folds its two neighbours into one [`Expr::Binary`]. Parenthesised groups are
//! resolved first and then behave as single operands.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
}

impl BinOp {
    pub const fn priority(self) -> u8 {
        match self {
            BinOp::Mul => 2,
            BinOp::Add | BinOp::Sub => 1,
        }
    }

    pub fn apply(self, lhs: u16, rhs: u16) -> u16 {
        match self {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
        }
    }

    const fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
        }
    }
}

/// `<structure> symbol.member`: the address of `symbol` plus the offset of `member`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpretAs {
    pub structure: String,
    pub symbol: String,
    pub member: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(u16),
    Variable(String),
    InterpretAs(InterpretAs),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// A leaf whose value is only known once symbols are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaf<'a> {
    Variable(&'a str),
    InterpretAs(&'a InterpretAs),
}

impl Expr {
    /// Evaluates the tree with 16-bit wrapping arithmetic, asking `leaf` for the value
    /// of every named leaf.
    pub fn fold<E, F>(&self, leaf: &F) -> Result<u16, E>
    where
        F: Fn(Leaf<'_>) -> Result<u16, E>,
    {
        match self {
            Expr::Literal(value) => Ok(*value),
            Expr::Variable(name) => leaf(Leaf::Variable(name)),
            Expr::InterpretAs(access) => leaf(Leaf::InterpretAs(access)),
            Expr::Binary { op, lhs, rhs } => Ok(op.apply(lhs.fold(leaf)?, rhs.fold(leaf)?)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "${:04X}", value),
            Expr::Variable(name) => write!(f, "!{}", name),
            Expr::InterpretAs(i) => write!(f, "<{}> {}.{}", i.structure, i.symbol, i.member),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

/// An operand inside brackets before precedence is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Expr(Expr),
    Group(Box<Sequence>),
}

/// Alternating operands and operators, exactly as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub head: Term,
    pub tail: Vec<(BinOp, Term)>,
}

impl Term {
    fn resolve(self) -> Expr {
        match self {
            Term::Expr(expr) => expr,
            Term::Group(seq) => (*seq).resolve(),
        }
    }
}

impl Sequence {
    pub fn single(term: Term) -> Self {
        Sequence {
            head: term,
            tail: Vec::new(),
        }
    }

    pub fn push(&mut self, op: BinOp, term: Term) {
        self.tail.push((op, term));
    }

    pub fn resolve(self) -> Expr {
        let mut operands = vec![self.head.resolve()];
        let mut ops = Vec::with_capacity(self.tail.len());
        for (op, term) in self.tail {
            ops.push(op);
            operands.push(term.resolve());
        }

        while !ops.is_empty() {
            let mut best = 0;
            for (i, op) in ops.iter().enumerate() {
                if op.priority() > ops[best].priority() {
                    best = i;
                }
            }

            let op = ops.remove(best);
            let rhs = operands.remove(best + 1);
            let lhs = std::mem::replace(&mut operands[best], Expr::Literal(0));
            operands[best] = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        operands.swap_remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(v: u16) -> Term {
        Term::Expr(Expr::Literal(v))
    }

    fn seq(head: Term, tail: Vec<(BinOp, Term)>) -> Sequence {
        Sequence { head, tail }
    }

    fn eval(expr: &Expr) -> u16 {
        expr.fold(&|_: Leaf<'_>| Err::<u16, ()>(())).unwrap()
    }

    #[test]
    fn multiplication_binds_tighter() {
        // [$05 * $02 + $03]
        let expr = seq(lit(5), vec![(BinOp::Mul, lit(2)), (BinOp::Add, lit(3))]).resolve();
        assert_eq!(eval(&expr), 13);
        assert_eq!(expr.to_string(), "(($0005 * $0002) + $0003)");

        // [$03 + $05 * $02]
        let expr = seq(lit(3), vec![(BinOp::Add, lit(5)), (BinOp::Mul, lit(2))]).resolve();
        assert_eq!(eval(&expr), 13);
    }

    #[test]
    fn plus_and_minus_are_left_to_right() {
        // [$0A - $03 + $02] is (10 - 3) + 2, not 10 - (3 + 2)
        let expr = seq(lit(10), vec![(BinOp::Sub, lit(3)), (BinOp::Add, lit(2))]).resolve();
        assert_eq!(eval(&expr), 9);

        let expr = seq(lit(10), vec![(BinOp::Add, lit(3)), (BinOp::Sub, lit(2))]).resolve();
        assert_eq!(eval(&expr), 11);
    }

    #[test]
    fn groups_are_single_operands() {
        // [$05 * ($02 + $03)]
        let group = Term::Group(Box::new(seq(lit(2), vec![(BinOp::Add, lit(3))])));
        let expr = seq(lit(5), vec![(BinOp::Mul, group)]).resolve();
        assert_eq!(eval(&expr), 25);
    }

    #[test]
    fn arithmetic_wraps() {
        let expr = seq(lit(0), vec![(BinOp::Sub, lit(1))]).resolve();
        assert_eq!(eval(&expr), 0xFFFF);

        let expr = seq(lit(0x100), vec![(BinOp::Mul, lit(0x100))]).resolve();
        assert_eq!(eval(&expr), 0);
    }

    #[test]
    fn leaves_are_looked_up() {
        let expr = seq(
            Term::Expr(Expr::Variable("base".into())),
            vec![(BinOp::Add, lit(4))],
        )
        .resolve();

        let value = expr.fold(&|leaf| match leaf {
            Leaf::Variable("base") => Ok(0x100),
            _ => Err(()),
        });
        assert_eq!(value, Ok(0x104));
    }

    #[test]
    fn every_named_leaf_is_visited() {
        // [(!a + <S> b.c) * !a]
        let access = InterpretAs {
            structure: "S".into(),
            symbol: "b".into(),
            member: "c".into(),
        };
        let group = Term::Group(Box::new(seq(
            Term::Expr(Expr::Variable("a".into())),
            vec![(BinOp::Add, Term::Expr(Expr::InterpretAs(access)))],
        )));
        let expr = seq(group, vec![(BinOp::Mul, Term::Expr(Expr::Variable("a".into())))]).resolve();

        let visited = std::cell::RefCell::new(Vec::new());
        let value = expr.fold(&|leaf| {
            visited.borrow_mut().push(format!("{:?}", leaf));
            match leaf {
                Leaf::Variable(_) => Ok::<u16, ()>(3),
                Leaf::InterpretAs(access) => Ok(access.member.len() as u16),
            }
        });

        assert_eq!(value, Ok(12));
        assert_eq!(visited.borrow().len(), 3);
    }
}
