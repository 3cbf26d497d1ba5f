pub mod tw_market;
