/// Parallel join: run `$a` and `$b`, potentially on two threads.
macro_rules! par_join {
    ($a:expr, $b:expr) => {{
        #[cfg(feature = "parallel")]
        {
            rayon::join($a, $b)
        }
        #[cfg(not(feature = "parallel"))]
        {
            (($a)(), ($b)())
        }
    }};
}

/// Parallel mutable for-each: apply `$f` to each element of `$slice` in place.
macro_rules! par_for_each_mut {
    ($slice:expr, $f:expr) => {{
        #[cfg(feature = "parallel")]
        {
            use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
            $slice.par_iter_mut().for_each($f);
        }
        #[cfg(not(feature = "parallel"))]
        {
            $slice.iter_mut().for_each($f);
        }
    }};
}
