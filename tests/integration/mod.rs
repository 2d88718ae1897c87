mod helpers;
mod test_engines;
mod test_run;
