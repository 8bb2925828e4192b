/// # Select one ready channel operation among several
///
/// select! supports three different clauses:
///
/// * pattern = <-channel => code,
/// * pattern = channel<-expression => code,
/// * default => code,
///
/// It evaluates to `Result<Suspension<R>, SelectError>` where `R` is type of `code` which must be
/// same across all clauses. Await the suspension to get result of selected clause.
///
/// ## Restrictions
/// * `channel` must be ident but not expression.
/// * `pattern` must be irrefutable.
/// * `code` runs as clause callback, so it captures by move and could not borrow locals.
///
/// ## Evaluation
/// * Expressions to send are evaluated before selection, unsent values are dropped.
/// * `default` case is run if no channel is ready.
/// * Without `default`, the select blocks till some channel becomes ready.
///
/// ## Examples
/// ```rust
/// use cospawn::channel::Channel;
/// use cospawn::select;
///
/// #[cospawn::main]
/// async fn main() {
///     let numbers = Channel::new(1);
///     let words = Channel::new(1);
///     numbers.send(5).await;
///     let got = select! {
///         n = <-numbers => Some(n * 2),
///         _ = words<-"hello" => None,
///     }
///     .unwrap()
///     .await;
///     assert!(got == Some(10) || got.is_none());
///
///     let got = select! {
///         n = <-numbers => n,
///         default => 0,
///     }
///     .unwrap()
///     .await;
///     assert!(got == 0 || got == 5);
/// }
/// ```
#[macro_export]
macro_rules! select {
    ($($tokens:tt)*) => {
        $crate::select_internal!(@list ($($tokens)*) ())
    }
}

// @list lists clauses as `Clause` constructing expressions with trailing comma.
#[doc(hidden)]
#[macro_export]
macro_rules! select_internal {
    (@list
        ()
        ($($clauses:expr,)*)
    ) => {
        $crate::select::select(::std::vec![$($clauses),*])
    };

    // `default` clause. `block` is a special kind of `expr`, match it first.
    (@list
        (default => $body:block, $($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ($($tokens)*)
            ($($clauses)* $crate::select::Clause::default_case(move || $body),)
        )
    };
    (@list
        (default => $body:block $($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ($($tokens)*)
            ($($clauses)* $crate::select::Clause::default_case(move || $body),)
        )
    };
    (@list
        (default => $body:expr, $($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ($($tokens)*)
            ($($clauses)* $crate::select::Clause::default_case(move || $body),)
        )
    };
    (@list
        (default => $body:expr)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ()
            ($($clauses)* $crate::select::Clause::default_case(move || $body),)
        )
    };

    // get clause.
    (@list
        ($bind:pat_param = <- $r:ident => $body:block, $($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ($($tokens)*)
            ($($clauses)* $crate::select::Clause::get(&$r, move |$bind| $body),)
        )
    };
    (@list
        ($bind:pat_param = <- $r:ident => $body:block $($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ($($tokens)*)
            ($($clauses)* $crate::select::Clause::get(&$r, move |$bind| $body),)
        )
    };
    (@list
        ($bind:pat_param = <- $r:ident => $body:expr, $($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ($($tokens)*)
            ($($clauses)* $crate::select::Clause::get(&$r, move |$bind| $body),)
        )
    };
    (@list
        ($bind:pat_param = <- $r:ident => $body:expr)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ()
            ($($clauses)* $crate::select::Clause::get(&$r, move |$bind| $body),)
        )
    };

    // send clause.
    (@list
        ($bind:pat_param = $w:ident <- $value:expr => $body:block, $($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ($($tokens)*)
            ($($clauses)* $crate::select::Clause::send(&$w, $value, move || { let $bind = (); $body }),)
        )
    };
    (@list
        ($bind:pat_param = $w:ident <- $value:expr => $body:block $($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ($($tokens)*)
            ($($clauses)* $crate::select::Clause::send(&$w, $value, move || { let $bind = (); $body }),)
        )
    };
    (@list
        ($bind:pat_param = $w:ident <- $value:expr => $body:expr, $($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ($($tokens)*)
            ($($clauses)* $crate::select::Clause::send(&$w, $value, move || { let $bind = (); $body }),)
        )
    };
    (@list
        ($bind:pat_param = $w:ident <- $value:expr => $body:expr)
        ($($clauses:tt)*)
    ) => {
        $crate::select_internal!(
            @list
            ()
            ($($clauses)* $crate::select::Clause::send(&$w, $value, move || { let $bind = (); $body }),)
        )
    };

    (@list
        ($($tokens:tt)*)
        ($($clauses:tt)*)
    ) => {
        ::std::compile_error!(::std::concat!("select!: invalid clause: ", ::std::stringify!($($tokens)*)))
    };
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use crate::channel::Channel;
    use crate::error::SelectError;
    use crate::{select, task};

    #[crate::test(crate = "crate")]
    async fn select_macro_default() {
        let channel = Channel::<i32>::new(0);
        let got = select! {
            v = <-channel => Some(v),
            default => None,
        }
        .unwrap()
        .await;
        assert_eq!(got, None);
    }

    #[crate::test(crate = "crate")]
    async fn select_macro_get() {
        let channel = Channel::new(1);
        channel.send(3).await;
        let got = select! {
            v = <-channel => { v + 1 }
            default => { 0 }
        }
        .unwrap()
        .await;
        assert_eq!(got, 4);
    }

    #[crate::test(crate = "crate")]
    async fn select_macro_send() {
        let channel = Channel::new(1);
        let sent = Rc::new(Cell::new(false));
        let flag = sent.clone();
        let () = select! {
            _ = channel<-7 => flag.set(true),
        }
        .unwrap()
        .await;
        assert!(sent.get());
        assert_eq!(channel.get().await, 7);
    }

    #[crate::test(crate = "crate")]
    async fn select_macro_blocking() {
        let channel = Channel::new(0);
        task::spawn({
            let channel = channel.clone();
            async move {
                channel.send("ping").await;
            }
        });
        let got = select! {
            v = <-channel => v,
        }
        .unwrap()
        .await;
        assert_eq!(got, "ping");
    }

    #[test]
    fn select_macro_duplicate_default() {
        let err = select! {
            default => 1,
            default => 2,
        }
        .unwrap_err();
        assert_eq!(err, SelectError::DuplicateDefault);
    }
}
